// Integration tests for a full networked battle: a real server on an
// ephemeral port driven by raw WebSocket clients.

use std::time::Duration;

use battle_backend::config::{BattleTiming, Config};
use battle_backend::protocol::{
    ClientMessage, FinishReport, JoinQueue, JoinRoom, Matched, ProgressUpdate, Role,
    ServerMessage,
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP: Duration = Duration::from_millis(100);
const ROUND_CAP: Duration = Duration::from_secs(2);

async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config {
        port: addr.port(),
        timing: BattleTiming {
            countdown_from: 3,
            countdown_step: STEP,
            go_delay: Duration::from_millis(50),
            round_cap: ROUND_CAP,
            finished_ttl: Duration::from_secs(2),
            join_timeout: Duration::from_secs(1),
        },
        ..Config::default()
    };
    tokio::spawn(async move {
        battle_backend::serve(listener, &config).await.unwrap();
    });
    format!("ws://{addr}")
}

async fn connect(url: String) -> Ws {
    connect_async(url).await.unwrap().0
}

async fn send(ws: &mut Ws, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).unwrap();
    ws.send(Message::text(text)).await.unwrap();
}

/// Next server frame, skipping non-text frames. Panics after 5 s.
async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Frames received within `window`, stopping early if the socket closes.
async fn drain(ws: &mut Ws, window: Duration) -> Vec<ServerMessage> {
    let deadline = Instant::now() + window;
    let mut seen = Vec::new();
    while let Ok(Some(Ok(frame))) = tokio::time::timeout_at(deadline, ws.next()).await {
        if let Message::Text(text) = frame {
            seen.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    seen
}

async fn queue(base: &str, name: &str) -> Ws {
    let mut lobby = connect(format!("{base}/ws/matchmaker")).await;
    send(
        &mut lobby,
        &ClientMessage::JoinQueue(JoinQueue {
            display_name: name.into(),
            player_id: Some(name.to_lowercase()),
        }),
    )
    .await;
    lobby
}

async fn until_matched(ws: &mut Ws) -> Matched {
    loop {
        if let ServerMessage::Matched(m) = recv(ws).await {
            return m;
        }
    }
}

async fn join_room(base: &str, room_id: &str, player_id: &str, name: &str) -> Ws {
    let mut room = connect(format!("{base}/ws/battle/{room_id}")).await;
    send(
        &mut room,
        &ClientMessage::JoinRoom(JoinRoom {
            player_id: player_id.into(),
            display_name: name.into(),
        }),
    )
    .await;
    room
}

/// Queue Alice and Bob, seat both in their room and wait for `game_start`.
async fn start_battle(base: &str) -> (Ws, Ws) {
    let mut alice_lobby = queue(base, "Alice").await;
    assert!(matches!(recv(&mut alice_lobby).await, ServerMessage::Waiting(_)));
    let mut bob_lobby = queue(base, "Bob").await;

    let alice_match = until_matched(&mut alice_lobby).await;
    let bob_match = until_matched(&mut bob_lobby).await;

    let mut alice = join_room(base, &alice_match.room_id, "alice", "Alice").await;
    let mut bob = join_room(base, &bob_match.room_id, "bob", "Bob").await;

    for ws in [&mut alice, &mut bob] {
        loop {
            if let ServerMessage::GameStart(_) = recv(ws).await {
                break;
            }
        }
    }
    (alice, bob)
}

fn update(wpm: f64) -> ClientMessage {
    ClientMessage::TypingUpdate(ProgressUpdate {
        char_index: 20,
        total_chars: 100,
        progress: 20.0,
        current_wpm: wpm,
        current_accuracy: 97.0,
    })
}

fn finished(wpm: f64, accuracy: f64) -> ClientMessage {
    ClientMessage::Finished(FinishReport {
        wpm,
        accuracy,
        errors: 2,
        chars_typed: 100,
        completion_time: 30_000,
    })
}

// ── Matchmaking ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_players_share_room_and_passage() {
    let base = start_server().await;

    let mut alice = queue(&base, "Alice").await;
    match recv(&mut alice).await {
        ServerMessage::Waiting(w) => assert_eq!(w.position, 1),
        other => panic!("unexpected {other:?}"),
    }
    let mut bob = queue(&base, "Bob").await;

    let a = until_matched(&mut alice).await;
    let b = until_matched(&mut bob).await;

    assert_eq!(a.room_id, b.room_id);
    assert_eq!(a.passage, b.passage);
    assert!(a.room_id.starts_with("battle-"));
    assert_eq!(a.opponent.display_name, "Bob");
    assert_eq!(b.opponent.display_name, "Alice");
    // The ids each side will claim in `join_room`.
    assert_eq!(a.opponent.id, "bob");
    assert_eq!(b.opponent.id, "alice");
    assert_eq!(a.your_role, Role::Player1);
    assert_eq!(b.your_role, Role::Player2);
}

#[tokio::test]
async fn test_join_queue_without_payload_is_anonymous() {
    let base = start_server().await;

    let mut nobody = connect(format!("{base}/ws/matchmaker")).await;
    nobody
        .send(Message::text(r#"{"type":"join_queue"}"#))
        .await
        .unwrap();
    assert!(matches!(recv(&mut nobody).await, ServerMessage::Waiting(_)));

    let mut bob = queue(&base, "Bob").await;
    let m = until_matched(&mut bob).await;
    assert_eq!(m.opponent.display_name, "Anonymous");
}

// ── Room lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn test_countdown_then_game_start() {
    let base = start_server().await;
    let mut alice_lobby = queue(&base, "Alice").await;
    let mut bob_lobby = queue(&base, "Bob").await;
    let m = until_matched(&mut alice_lobby).await;
    until_matched(&mut bob_lobby).await;

    let mut alice = join_room(&base, &m.room_id, "alice", "Alice").await;
    let _bob = join_room(&base, &m.room_id, "bob", "Bob").await;

    let mut counts = Vec::new();
    let mut first_at = None;
    loop {
        match recv(&mut alice).await {
            ServerMessage::Countdown(c) => {
                first_at.get_or_insert_with(Instant::now);
                counts.push(c.count);
            }
            ServerMessage::GameStart(start) => {
                assert!(start.start_time > 0);
                break;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(counts, vec![3, 2, 1, 0]);
    let spread = first_at.unwrap().elapsed();
    assert!(spread >= STEP * 3, "countdown took {spread:?}");
}

#[tokio::test]
async fn test_progress_is_relayed_and_implausible_wpm_dropped() {
    let base = start_server().await;
    let (mut alice, mut bob) = start_battle(&base).await;

    send(&mut alice, &update(250.0)).await;
    send(&mut alice, &update(62.0)).await;

    match recv(&mut bob).await {
        ServerMessage::OpponentProgress(p) => {
            assert_eq!(p.player_id, "alice");
            assert_eq!(p.current_wpm, 62.0, "the 250 WPM sample must never be relayed");
            assert!(p.timestamp > 0);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Nothing comes back to the sender.
    let echoed = drain(&mut alice, Duration::from_millis(200)).await;
    assert!(echoed.is_empty(), "sender got {echoed:?}");

    // Garbage is ignored and the socket stays usable.
    alice.send(Message::text("not json")).await.unwrap();
    send(&mut alice, &update(63.0)).await;
    assert!(matches!(
        recv(&mut bob).await,
        ServerMessage::OpponentProgress(p) if p.current_wpm == 63.0
    ));
}

#[tokio::test]
async fn test_faster_typist_wins() {
    let base = start_server().await;
    let (mut alice, mut bob) = start_battle(&base).await;

    send(&mut alice, &finished(70.0, 98.0)).await;
    match recv(&mut bob).await {
        ServerMessage::OpponentFinished(r) => {
            assert_eq!(r.player_id, "alice");
            assert_eq!(r.wpm, 70.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    send(&mut bob, &finished(55.0, 99.0)).await;

    for ws in [&mut alice, &mut bob] {
        let result = loop {
            if let ServerMessage::GameOver(result) = recv(ws).await {
                break result;
            }
        };
        assert_eq!(result.winner.as_deref(), Some("alice"));
        assert_eq!(result.margin.wpm_diff, 15.0);
        assert!(result.players["alice"].is_winner);
        assert_eq!(result.players["bob"].display_name, "Bob");
    }

    // The hard cap firing later must not produce a second result.
    let later = drain(&mut alice, ROUND_CAP + Duration::from_millis(300)).await;
    assert!(
        !later.iter().any(|m| matches!(m, ServerMessage::GameOver(_))),
        "second game_over: {later:?}"
    );
}

#[tokio::test]
async fn test_hard_cap_ends_round_without_results() {
    let base = start_server().await;
    let (mut alice, _bob) = start_battle(&base).await;

    let started = Instant::now();
    let result = loop {
        if let ServerMessage::GameOver(result) = recv(&mut alice).await {
            break result;
        }
    };
    assert!(started.elapsed() >= ROUND_CAP - Duration::from_millis(100));
    assert_eq!(result.winner, None);
    assert_eq!(result.margin.wpm_diff, 0.0);
    assert_eq!(result.players["bob"].completion_time, 60_000);
}

#[tokio::test]
async fn test_disconnect_notifies_opponent_without_game_over() {
    let base = start_server().await;
    let (mut alice, mut bob) = start_battle(&base).await;

    bob.close(None).await.unwrap();
    drop(bob);

    assert_eq!(recv(&mut alice).await, ServerMessage::OpponentLeft);
    let rest = drain(&mut alice, ROUND_CAP + Duration::from_millis(300)).await;
    assert!(
        !rest.iter().any(|m| matches!(m, ServerMessage::GameOver(_))),
        "abandoned room sent {rest:?}"
    );
}

#[tokio::test]
async fn test_lone_joiner_is_released_when_opponent_never_arrives() {
    let base = start_server().await;
    let mut alice_lobby = queue(&base, "Alice").await;
    let mut bob_lobby = queue(&base, "Bob").await;
    let m = until_matched(&mut alice_lobby).await;
    until_matched(&mut bob_lobby).await;

    let mut alice = join_room(&base, &m.room_id, "alice", "Alice").await;
    assert_eq!(recv(&mut alice).await, ServerMessage::OpponentLeft);

    // The room is gone; a late arrival finds nothing.
    let mut bob = join_room(&base, &m.room_id, "bob", "Bob").await;
    assert_eq!(recv(&mut bob).await, ServerMessage::error("room not found"));
}

#[tokio::test]
async fn test_unknown_and_full_rooms_are_refused() {
    let base = start_server().await;

    let mut lost = join_room(&base, "battle-nope", "ghost", "Ghost").await;
    assert_eq!(recv(&mut lost).await, ServerMessage::error("room not found"));
    // The socket stays open for another attempt.
    send(
        &mut lost,
        &ClientMessage::JoinRoom(JoinRoom {
            player_id: "ghost".into(),
            display_name: "Ghost".into(),
        }),
    )
    .await;
    assert_eq!(recv(&mut lost).await, ServerMessage::error("room not found"));

    let mut alice_lobby = queue(&base, "Alice").await;
    let mut bob_lobby = queue(&base, "Bob").await;
    let m = until_matched(&mut alice_lobby).await;
    until_matched(&mut bob_lobby).await;
    let _alice = join_room(&base, &m.room_id, "alice", "Alice").await;
    let _bob = join_room(&base, &m.room_id, "bob", "Bob").await;

    let mut carol = join_room(&base, &m.room_id, "carol", "Carol").await;
    assert_eq!(recv(&mut carol).await, ServerMessage::error("room is full"));
}

#[tokio::test]
async fn test_rematch_request_is_relayed_after_game_over() {
    let base = start_server().await;
    let (mut alice, mut bob) = start_battle(&base).await;

    send(&mut alice, &finished(60.0, 97.0)).await;
    send(&mut bob, &finished(60.0, 97.0)).await;
    let result = loop {
        if let ServerMessage::GameOver(result) = recv(&mut alice).await {
            break result;
        }
    };
    assert_eq!(result.winner, None, "exact tie is a draw");

    send(&mut alice, &ClientMessage::RequestRematch).await;
    loop {
        match recv(&mut bob).await {
            ServerMessage::RematchRequested(r) => {
                assert_eq!(r.by, "alice");
                break;
            }
            ServerMessage::OpponentFinished(_) | ServerMessage::GameOver(_) => continue,
            other => panic!("unexpected {other:?}"),
        }
    }
}
