//! End-to-end tests over real UDP sockets: the join handshake, snapshot
//! delivery and ordering, and the ack protocol against a running master.

use server::network::Server;
use shared::{GameConfig, GameState, Message, MessageBody, NodeRole, PlayerType, MAX_DATAGRAM};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};

fn test_config() -> GameConfig {
    GameConfig {
        width: 20,
        height: 20,
        food_static: 2,
        food_per_player: 1.0,
        state_delay_ms: 50,
        dead_food_prob: 0.5,
        ping_delay_ms: 50,
        node_timeout_ms: 5000,
    }
}

async fn start_master() -> SocketAddr {
    let mut server = Server::bind("127.0.0.1:0", test_config(), "host")
        .await
        .expect("bind master");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

fn join_message(name: &str, only_view: bool) -> Message {
    Message::new(MessageBody::Join {
        player_name: name.to_string(),
        only_view,
        player_type: PlayerType::Human,
    })
}

/// Send a join and wait for the matching ack or an error reply, skipping
/// any interleaved traffic.
async fn join(socket: &UdpSocket, master: SocketAddr, name: &str, only_view: bool) -> Message {
    let join = join_message(name, only_view);
    socket
        .send_to(&join.encode().unwrap(), master)
        .await
        .unwrap();
    let mut buffer = [0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("reply within window")
            .unwrap();
        if from != master {
            continue;
        }
        let reply = Message::decode(&buffer[..len]).unwrap();
        match &reply.body {
            MessageBody::Ack if reply.seq == join.seq => return reply,
            MessageBody::Error { .. } => return reply,
            _ => continue,
        }
    }
}

/// Wait for the next snapshot from the master and acknowledge it.
async fn next_snapshot(socket: &UdpSocket, master: SocketAddr, sender: u32) -> GameState {
    let mut buffer = [0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("snapshot within window")
            .unwrap();
        if from != master {
            continue;
        }
        let Ok(message) = Message::decode(&buffer[..len]) else {
            continue;
        };
        if let MessageBody::State { state } = message.body {
            let ack = Message::ack(message.seq).with_sender(sender);
            socket
                .send_to(&ack.encode().unwrap(), master)
                .await
                .unwrap();
            return state;
        }
    }
}

#[tokio::test]
async fn join_handshake_assigns_player_id() {
    let master = start_master().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let reply = join(&socket, master, "ada", false).await;

    assert!(matches!(reply.body, MessageBody::Ack));
    assert_eq!(reply.receiver_id, Some(1));
    assert_eq!(reply.sender_id, Some(0));
}

#[tokio::test]
async fn duplicate_address_join_is_rejected() {
    let master = start_master().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let first = join(&socket, master, "ada", false).await;
    assert!(matches!(first.body, MessageBody::Ack));

    let second = join(&socket, master, "ada-again", false).await;
    match second.body {
        MessageBody::Error { message } => assert!(message.contains("already joined")),
        other => panic!("expected an error reply, got {:?}", other),
    }
}

#[tokio::test]
async fn snapshot_orders_strictly_increase() {
    let master = start_master().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    join(&socket, master, "ada", false).await;

    let first = next_snapshot(&socket, master, 1).await;
    let second = next_snapshot(&socket, master, 1).await;

    assert!(second.order > first.order);
    assert!(first.players.iter().any(|p| p.name == "ada"));
    assert!(first.snakes.iter().any(|s| s.player_id == 1));
    assert_eq!(first.config.width, 20);
}

#[tokio::test]
async fn viewer_join_registers_without_snake() {
    let master = start_master().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let reply = join(&socket, master, "watcher", true).await;
    assert!(matches!(reply.body, MessageBody::Ack));
    let id = reply.receiver_id.unwrap();

    let state = next_snapshot(&socket, master, id).await;
    let me = state.players.iter().find(|p| p.id == id).unwrap();
    assert_eq!(me.role, NodeRole::Viewer);
    assert!(!state.snakes.iter().any(|s| s.player_id == id));
}

#[tokio::test]
async fn ping_is_acknowledged_with_same_sequence() {
    let master = start_master().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let ping = Message::new(MessageBody::Ping);
    socket
        .send_to(&ping.encode().unwrap(), master)
        .await
        .unwrap();

    let mut buffer = [0u8; MAX_DATAGRAM];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
        .await
        .expect("ack within window")
        .unwrap();
    let reply = Message::decode(&buffer[..len]).unwrap();
    assert!(matches!(reply.body, MessageBody::Ack));
    assert_eq!(reply.seq, ping.seq);
}

#[tokio::test]
async fn full_client_joins_and_receives_state() {
    let master = start_master().await;
    let (mut client, steer) =
        client::network::Client::join(master, "crab", false, test_config())
            .await
            .expect("client join");
    assert_eq!(client.player_id(), 1);

    // run the client loop long enough to accept a few snapshots
    tokio::select! {
        result = client.run() => result.expect("client loop"),
        _ = tokio::time::sleep(Duration::from_millis(400)) => {}
    }
    assert!(client.game().last_order() >= 1);
    assert!(client
        .game()
        .players()
        .iter()
        .any(|player| player.name == "crab"));
    drop(steer);
}
