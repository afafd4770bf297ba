// The opponent feed capability and its networked implementation.
//
// A feed carries the controller's outbound messages to wherever the opponent
// lives and pushes everything the opponent side says back into the
// controller's event channel. The controller picks one feed per match.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::ControllerEvent;
use crate::error::ClientError;
use crate::protocol::{
    self, ClientMessage, FinishReport, JoinQueue, JoinRoom, ProgressUpdate, ServerMessage,
};

pub trait OpponentFeed: Send {
    /// The id this client is known by in the room's results.
    fn player_id(&self) -> &str;

    /// Fire-and-forget delivery of one outbound message.
    fn send(&self, message: ClientMessage) -> Result<(), ClientError>;

    fn is_simulated(&self) -> bool;

    fn submit_progress(&self, update: ProgressUpdate) -> Result<(), ClientError> {
        self.send(ClientMessage::TypingUpdate(update))
    }

    fn submit_finished(&self, report: FinishReport) -> Result<(), ClientError> {
        self.send(ClientMessage::Finished(report))
    }

    fn request_rematch(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::RequestRematch)
    }

    fn leave(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::Leave)
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Feed backed by the battle server: matchmaker socket first, then the
/// room socket once `matched` arrives.
///
/// Dropping the feed closes its command channel; the session task flushes
/// whatever was already queued (a final `leave`, say) and closes the socket.
#[derive(Debug)]
pub struct RemoteOpponentFeed {
    player_id: String,
    commands: UnboundedSender<ClientMessage>,
    _session: JoinHandle<()>,
}

impl RemoteOpponentFeed {
    /// Connect to the matchmaker under `base_url` (e.g. `ws://127.0.0.1:3000`)
    /// and join the queue. Fails only if the matchmaker cannot be reached.
    pub async fn connect(
        base_url: &str,
        display_name: &str,
        events: UnboundedSender<ControllerEvent>,
    ) -> Result<Self, ClientError> {
        let base = base_url.trim_end_matches('/').to_string();
        // Chosen up front so the opponent's `matched` names us by the same
        // id the room will use.
        let player_id = uuid::Uuid::new_v4().to_string();
        let (mut lobby, _) = connect_async(format!("{base}/ws/matchmaker")).await?;
        send_json(
            &mut lobby,
            &ClientMessage::JoinQueue(JoinQueue {
                display_name: display_name.to_string(),
                player_id: Some(player_id.clone()),
            }),
        )
        .await?;
        tracing::debug!(url = %base, player = %player_id, "Joined matchmaking queue");

        let (commands, rx) = mpsc::unbounded_channel();
        let session = Session {
            base,
            player_id: player_id.clone(),
            display_name: display_name.to_string(),
            events,
        };
        let session = tokio::spawn(session.run(lobby, rx));

        Ok(Self {
            player_id,
            commands,
            _session: session,
        })
    }
}

impl OpponentFeed for RemoteOpponentFeed {
    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        self.commands
            .send(message)
            .map_err(|_| ClientError::FeedClosed)
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

async fn send_json(socket: &mut Socket, msg: &ClientMessage) -> Result<(), ClientError> {
    let text = serde_json::to_string(msg)?;
    socket.send(Message::text(text)).await?;
    Ok(())
}

fn decode(frame: Message) -> Option<ServerMessage> {
    match frame {
        Message::Text(text) => protocol::decode_server(text.as_str()),
        _ => None,
    }
}

struct Session {
    base: String,
    player_id: String,
    display_name: String,
    events: UnboundedSender<ControllerEvent>,
}

impl Session {
    async fn run(self, lobby: Socket, commands: UnboundedReceiver<ClientMessage>) {
        if let Err(e) = self.drive(lobby, commands).await {
            tracing::warn!("Battle connection lost: {e}");
        }
        let _ = self.events.send(ControllerEvent::FeedClosed);
    }

    fn forward(&self, msg: ServerMessage) -> Result<(), ClientError> {
        self.events
            .send(ControllerEvent::Server(msg))
            .map_err(|_| ClientError::FeedClosed)
    }

    async fn drive(
        &self,
        mut lobby: Socket,
        mut commands: UnboundedReceiver<ClientMessage>,
    ) -> Result<(), ClientError> {
        // ── Matchmaking ──────────────────────────────────────────────
        let room_id = loop {
            tokio::select! {
                frame = lobby.next() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    let Some(msg) = decode(frame?) else {
                        continue;
                    };
                    let room_id = match &msg {
                        ServerMessage::Matched(m) => Some(m.room_id.clone()),
                        _ => None,
                    };
                    self.forward(msg)?;
                    if let Some(room_id) = room_id {
                        break room_id;
                    }
                }
                cmd = commands.recv() => match cmd {
                    Some(ClientMessage::Leave) | None => {
                        let _ = send_json(&mut lobby, &ClientMessage::Leave).await;
                        let _ = lobby.close(None).await;
                        return Ok(());
                    }
                    Some(other) => {
                        tracing::debug!(kind = %other.kind(), "Dropping message sent before a match");
                    }
                }
            }
        };
        let _ = lobby.close(None).await;

        // ── Battle room ──────────────────────────────────────────────
        let (mut room, _) = connect_async(format!("{}/ws/battle/{room_id}", self.base)).await?;
        send_json(
            &mut room,
            &ClientMessage::JoinRoom(JoinRoom {
                player_id: self.player_id.clone(),
                display_name: self.display_name.clone(),
            }),
        )
        .await?;
        tracing::debug!(room = %room_id, player = %self.player_id, "Joined battle room");

        loop {
            tokio::select! {
                frame = room.next() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    if let Some(msg) = decode(frame?) {
                        self.forward(msg)?;
                    }
                }
                cmd = commands.recv() => match cmd {
                    Some(msg) => {
                        let leaving = msg == ClientMessage::Leave;
                        send_json(&mut room, &msg).await?;
                        if leaving {
                            let _ = room.close(None).await;
                            return Ok(());
                        }
                    }
                    None => {
                        let _ = room.close(None).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
