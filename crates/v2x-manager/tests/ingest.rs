//! End-to-end ingestion over a loopback UDP socket.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use v2x_manager::{ManagerConfig, ManagerNode, RouterStats, SinkKind};
use v2x_sink::MemorySink;
use v2x_spat::{CanonicalState, IntersectionRegistry};

fn registry() -> IntersectionRegistry {
    IntersectionRegistry::from_json_str(
        r#"{"intersections": [
            {"id": 2351, "name": "Main & 1st", "phases": [2, 4, 6]},
            {"id": "2352", "phases": [1, 2]}
        ]}"#,
    )
    .unwrap()
}

fn config() -> ManagerConfig {
    ManagerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        sink: SinkKind::Memory,
        status_socket: None,
        ..ManagerConfig::default()
    }
}

fn spat(id: Value, phases: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "MsgType": "SPaT",
        "Timestamp_posix": 1700000000.0,
        "Spat": {
            "msgCnt": 1,
            "intersectionState": {"regionalID": 0, "intersectionID": id},
            "phaseState": phases
        }
    }))
    .unwrap()
}

// Counts datagrams whose dispatch has started; stopping the node afterwards
// lets the last one finish.
async fn wait_for_received(stats: &RouterStats, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.snapshot().received < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("datagrams were not processed in time");
}

#[tokio::test]
async fn malformed_datagram_does_not_stop_ingestion() {
    let sink = Arc::new(MemorySink::new());
    let node = ManagerNode::with_sink(config(), registry(), sink.clone())
        .await
        .unwrap();
    let addr = node.local_addr().unwrap();
    let engine = node.engine();
    let stats = node.stats();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(node.run_until(async {
        let _ = stop_rx.await;
    }));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let valid = spat(
        json!(2351),
        json!([
            {"phaseNo": 2, "currState": "protected_green", "minEndTime": 12.5, "maxEndTime": 20.0},
            {"phaseNo": 4, "currState": "red"},
            {"phaseNo": 8, "currState": "red"}
        ]),
    );

    client.send_to(&valid[..valid.len() / 2], addr).await.unwrap();
    client.send_to(b"\xff\xfe not text", addr).await.unwrap();
    client.send_to(&valid, addr).await.unwrap();
    client
        .send_to(&spat(json!(9999), json!([{"phaseNo": 2, "currState": "red"}])), addr)
        .await
        .unwrap();
    client
        .send_to(br#"{"MsgType": "SRM", "SignalRequest": {}}"#, addr)
        .await
        .unwrap();

    wait_for_received(&stats, 5).await;
    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    {
        let engine = engine.read().await;
        let snapshot = engine.store().get("2351").unwrap();
        let states: Vec<_> = snapshot.phase_states.iter().map(|p| (p.phase, p.state)).collect();
        assert_eq!(
            states,
            vec![
                (2, CanonicalState::ProtectedMovementAllowed),
                (4, CanonicalState::StopAndRemain),
                (6, CanonicalState::StopAndRemain),
            ]
        );
        assert!(engine.store().get("9999").is_none());
        assert_eq!(engine.store().len(), 2);
    }

    let counters = stats.snapshot();
    assert_eq!(counters.malformed, 2);
    assert_eq!(counters.spat, 1);
    assert_eq!(counters.unknown_intersection, 1);
    assert_eq!(counters.unrecognized, 1);

    // Shutdown drains the queue before closing the sink.
    assert!(sink.is_closed());
    assert_eq!(sink.put_count(), 1);
    let record = sink.get("intersection_status/2351").unwrap();
    assert_eq!(record["intersectionId"], "2351");
    assert_eq!(record["name"], "Main & 1st");
    assert_eq!(record["phaseStates"][0]["maxEndTime"], 20.0);
    assert_eq!(record["phaseStates"][1]["state"], "stopAndRemain");
}

#[tokio::test]
async fn vehicles_and_intersections_are_published_in_order() {
    let sink = Arc::new(MemorySink::new());
    let node = ManagerNode::with_sink(config(), registry(), sink.clone())
        .await
        .unwrap();
    let addr = node.local_addr().unwrap();
    let stats = node.stats();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(node.run_until(async {
        let _ = stop_rx.await;
    }));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for state in ["permissive_green", "permissive_yellow", "red"] {
        client
            .send_to(&spat(json!("2352"), json!([{"phaseNo": 2, "currState": state}])), addr)
            .await
            .unwrap();
    }
    let bsm = json!({
        "MsgType": "BSM",
        "BasicVehicle": {
            "temporaryID": 77,
            "position": {
                "latitude_DecimalDegree": 41.0,
                "longitude_DecimalDegree": -87.0,
                "elevation_Meter": 200.0
            },
            "speed_MeterPerSecond": 8.0,
            "heading_Degree": 180.0,
            "laneID": null,
            "approachID": null,
            "signalGroup": null
        }
    });
    client
        .send_to(&serde_json::to_vec(&bsm).unwrap(), addr)
        .await
        .unwrap();

    wait_for_received(&stats, 4).await;
    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    let states: Vec<Value> = sink
        .log()
        .into_iter()
        .filter(|(path, _)| path == "intersection_status/2352")
        .map(|(_, record)| record["phaseStates"][1]["state"].clone())
        .collect();
    assert_eq!(
        states,
        vec![
            json!("permissiveMovementAllowed"),
            json!("yellow"),
            json!("stopAndRemain")
        ]
    );

    let vehicle = sink.get("vehicle_status/77").unwrap();
    assert_eq!(vehicle["speed"], 8.0);
    assert_eq!(vehicle["lane_id"], Value::Null);
    assert_eq!(stats.snapshot().bsm, 1);
}
