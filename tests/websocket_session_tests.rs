//! End-to-end client transport: create a room over HTTP, connect a real websocket to
//! `/ws`, and exercise broadcast delivery, leave, and reconnect-with-replay.


use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use test_helpers::{spawn_game_host, TEST_APP_ID, TEST_APP_KEY};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wsnet2::protocol::types::{ClientInfo, RoomOption};
use wsnet2::protocol::wire::{Event, Message};
use wsnet2::rpc::CreateRoomReq;

fn test_room_option() -> RoomOption {
    RoomOption {
        number: None,
        search_group: 0,
        max_players: 4,
        visible: true,
        joinable: true,
        watchable: true,
        public_props: BTreeMap::new(),
        private_props: BTreeMap::new(),
        client_deadline_seconds: None,
    }
}

async fn create_room(addr: std::net::SocketAddr, client_id: &str) -> wsnet2::protocol::types::JoinedRoomRes {
    let http = reqwest::Client::new();
    let req = CreateRoomReq {
        app_id: TEST_APP_ID.to_string(),
        room_option: test_room_option(),
        client: ClientInfo { id: client_id.to_string(), props: BTreeMap::new() },
    };
    http.post(format!("http://{addr}/internal/rooms"))
        .json(&req)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn ws_url(addr: std::net::SocketAddr, res: &wsnet2::protocol::types::JoinedRoomRes, client_id: &str, since_seq: Option<u32>) -> String {
    let mut url = format!(
        "ws://{addr}/ws?app_id={}&room_id={}&client_id={}&nonce={}&hmac={}",
        TEST_APP_ID, res.room_info.id, client_id, res.token.nonce, res.token.hmac
    );
    if let Some(seq) = since_seq {
        url.push_str(&format!("&since_seq={seq}"));
    }
    url
}

#[tokio::test]
async fn connect_receives_peer_ready_then_broadcast() {
    let (addr, _room_store, _host_store) = spawn_game_host(10).await;
    let created = create_room(addr, "master").await;

    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url(addr, &created, "master", None))
        .await
        .expect("handshake should succeed with a valid token");

    let first = ws.next().await.unwrap().unwrap();
    let event: Event = match first {
        WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    };
    assert!(matches!(event, Event::PeerReady));

    let msg = Message::Broadcast { payload: vec![9, 9, 9] };
    ws.send(WsMessage::Text(serde_json::to_string(&msg).unwrap().into())).await.unwrap();

    let next = ws.next().await.unwrap().unwrap();
    let event: Event = match next {
        WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    };
    match event {
        Event::Message { sender, payload, .. } => {
            assert_eq!(sender, "master");
            assert_eq!(payload, vec![9, 9, 9]);
        }
        other => panic!("expected a Message event, got {other:?}"),
    }
}

#[tokio::test]
async fn reconnect_with_since_seq_replays_missed_events() {
    let (addr, _room_store, _host_store) = spawn_game_host(11).await;
    let created = create_room(addr, "master").await;

    let (mut first_conn, _) = tokio_tungstenite::connect_async(ws_url(addr, &created, "master", None))
        .await
        .unwrap();
    let _peer_ready = first_conn.next().await.unwrap().unwrap();

    // Send two broadcasts while connected, then drop the connection before reading them.
    for payload in [vec![1u8], vec![2u8]] {
        let msg = Message::Broadcast { payload };
        first_conn.send(WsMessage::Text(serde_json::to_string(&msg).unwrap().into())).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    first_conn.close(None).await.ok();
    drop(first_conn);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Reconnect the same client_id from seq 0 and expect history replay to hand back
    // the two broadcasts that happened while disconnected.
    let (mut second_conn, _) =
        tokio_tungstenite::connect_async(ws_url(addr, &created, "master", Some(0)))
            .await
            .unwrap();

    let mut replayed = Vec::new();
    for _ in 0..3 {
        let frame = second_conn.next().await.unwrap().unwrap();
        if let WsMessage::Text(text) = frame {
            let event: Event = serde_json::from_str(&text).unwrap();
            if !matches!(event, Event::PeerReady) {
                replayed.push(event);
            }
        }
    }
    assert!(replayed.len() >= 2, "expected at least the two broadcasts to be replayed, got {replayed:?}");
}
