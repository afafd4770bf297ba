// Room actor: a single tokio task that exclusively owns one `Room`, the
// outbound channels of its players and the room's only alarm.
//
// All inbound frames from both players are funnelled through one mpsc
// channel and handled one at a time. The alarm (join deadline, countdown
// tick, go, hard cap or reap) is plain data inside the actor, so it disappears with the task on
// every exit path.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::BattleTiming;
use crate::error::BattleError;
use crate::metrics;
use crate::protocol::{now_millis, ClientMessage, PlayerId, ServerMessage};

use super::room::{Outbound, Room, RoomStatus};

/// Commands accepted by a room actor. `conn_id` identifies the socket; a
/// seat belongs to the connection that claimed it.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        conn_id: String,
        player_id: PlayerId,
        display_name: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
    },
    Message {
        conn_id: String,
        message: ClientMessage,
    },
    Disconnect {
        conn_id: String,
    },
}

/// Point-in-time view of a room, published by its actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub status: RoomStatus,
    pub players: usize,
}

/// Cheap, cloneable address of a running room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: String,
    tx: mpsc::UnboundedSender<RoomCommand>,
    summary: watch::Receiver<RoomSummary>,
}

impl RoomHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns false if the room is already gone.
    pub fn join(
        &self,
        conn_id: &str,
        player_id: &str,
        display_name: &str,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> bool {
        self.tx
            .send(RoomCommand::Join {
                conn_id: conn_id.to_string(),
                player_id: player_id.to_string(),
                display_name: display_name.to_string(),
                tx,
            })
            .is_ok()
    }

    /// Fire-and-forget delivery of a client frame.
    pub fn send(&self, conn_id: &str, message: ClientMessage) -> bool {
        self.tx
            .send(RoomCommand::Message {
                conn_id: conn_id.to_string(),
                message,
            })
            .is_ok()
    }

    pub fn disconnect(&self, conn_id: &str) {
        let _ = self.tx.send(RoomCommand::Disconnect {
            conn_id: conn_id.to_string(),
        });
    }

    pub fn summary(&self) -> RoomSummary {
        self.summary.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alarm {
    JoinDeadline,
    Countdown(u8),
    Go,
    HardCap,
    Reap,
}

enum Flow {
    Continue,
    Stop,
}

struct RoomActor {
    room: Room,
    peers: HashMap<PlayerId, mpsc::UnboundedSender<ServerMessage>>,
    seats: HashMap<String, PlayerId>,
    timing: BattleTiming,
    alarm: Option<(Instant, Alarm)>,
    started_at: Option<Instant>,
    summary_tx: watch::Sender<RoomSummary>,
}

/// Spawn the actor for `room`. `on_exit` runs on the actor task once the
/// room has been torn down, whatever the reason.
pub fn spawn<F>(room: Room, timing: BattleTiming, on_exit: F) -> RoomHandle
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let initial = RoomSummary {
        id: room.id().to_string(),
        status: room.status(),
        players: room.players().len(),
    };
    let (summary_tx, summary_rx) = watch::channel(initial);
    let handle = RoomHandle {
        id: room.id().to_string(),
        tx,
        summary: summary_rx,
    };

    let actor = RoomActor {
        room,
        peers: HashMap::new(),
        seats: HashMap::new(),
        timing,
        alarm: Some((Instant::now() + timing.join_timeout, Alarm::JoinDeadline)),
        started_at: None,
        summary_tx,
    };

    tokio::spawn(async move {
        actor.run(rx).await;
        on_exit();
    });

    handle
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl RoomActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        let room_id = self.room.id().to_string();
        tracing::debug!(room = %room_id, "Room actor started");

        loop {
            let deadline = self.alarm.map(|(at, _)| at);
            let flow = tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => Flow::Stop,
                },
                _ = wait_until(deadline) => self.fire(),
            };
            if let Flow::Stop = flow {
                break;
            }
        }

        tracing::debug!(room = %room_id, status = %self.room.status(), "Room actor stopped");
    }

    fn handle(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                conn_id,
                player_id,
                display_name,
                tx,
            } => self.join(conn_id, player_id, &display_name, tx),
            RoomCommand::Message { conn_id, message } => match self.seats.get(&conn_id).cloned() {
                Some(player_id) => self.message(&player_id, message),
                None => {
                    self.reject(&conn_id, &BattleError::NotInRoom(conn_id.clone()));
                    Flow::Continue
                }
            },
            RoomCommand::Disconnect { conn_id } => match self.seats.remove(&conn_id) {
                Some(player_id) => self.depart(&player_id),
                None => Flow::Continue,
            },
        }
    }

    fn join(
        &mut self,
        conn_id: String,
        player_id: PlayerId,
        display_name: &str,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Flow {
        if let Some(seated) = self.seats.get(&conn_id) {
            tracing::debug!(room = %self.room.id(), player = %seated, "Connection already seated");
            return Flow::Continue;
        }
        if self.peers.contains_key(&player_id) {
            tracing::warn!(room = %self.room.id(), player = %player_id, "Seat claimed by another connection");
            let _ = tx.send(ServerMessage::error("player already in room"));
            return Flow::Continue;
        }

        match self.room.join(&player_id, display_name) {
            Ok(ready) => {
                tracing::info!(room = %self.room.id(), player = %player_id, "Player joined room");
                self.seats.insert(conn_id, player_id.clone());
                self.peers.insert(player_id, tx);
                if ready {
                    if let Err(e) = self.room.begin_countdown() {
                        tracing::warn!(room = %self.room.id(), "Cannot start countdown: {e}");
                    } else {
                        tracing::info!(room = %self.room.id(), "Room full, countdown started");
                        self.alarm = Some((
                            Instant::now(),
                            Alarm::Countdown(self.timing.countdown_from),
                        ));
                    }
                }
                self.publish();
            }
            Err(e) => {
                self.reject(&player_id, &e);
                if e == BattleError::RoomFull {
                    let _ = tx.send(ServerMessage::error(e.to_string()));
                }
            }
        }
        Flow::Continue
    }

    fn message(&mut self, player_id: &str, message: ClientMessage) -> Flow {
        let outcome = match message {
            ClientMessage::TypingUpdate(update) => self
                .room
                .typing_update(player_id, update, now_millis())
                .map(|out| self.deliver(out)),
            ClientMessage::Finished(report) => match self.room.finished(player_id, report) {
                Ok((out, all_done)) => {
                    self.deliver(out);
                    if all_done {
                        return self.finish("all_results");
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ClientMessage::RequestRematch => {
                self.room.rematch(player_id).map(|out| self.deliver(out))
            }
            ClientMessage::Leave => return self.depart(player_id),
            other => Err(BattleError::PrematureMessage {
                status: self.room.status(),
                kind: other.kind(),
            }),
        };

        if let Err(e) = outcome {
            self.reject(player_id, &e);
        }
        Flow::Continue
    }

    fn depart(&mut self, player_id: &str) -> Flow {
        self.peers.remove(player_id);
        self.seats.retain(|_, seated| seated != player_id);
        match self.room.leave(player_id) {
            Ok(notice) => {
                tracing::info!(room = %self.room.id(), player = %player_id, "Player left room");
                self.deliver(notice);
                self.publish();
                if self.room.is_abandoned() {
                    tracing::info!(room = %self.room.id(), "Match abandoned");
                    metrics::GAMES_ABANDONED_TOTAL.inc();
                    return Flow::Stop;
                }
                if self.room.players().is_empty() {
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Err(e) => {
                tracing::debug!(room = %self.room.id(), player = %player_id, "Ignoring departure: {e}");
                Flow::Continue
            }
        }
    }

    fn fire(&mut self) -> Flow {
        let Some((at, alarm)) = self.alarm.take() else {
            return Flow::Continue;
        };

        match alarm {
            Alarm::JoinDeadline => {
                if self.room.status() != RoomStatus::Waiting {
                    return Flow::Continue;
                }
                tracing::info!(
                    room = %self.room.id(),
                    seated = self.room.players().len(),
                    "Players never arrived, closing room"
                );
                self.deliver(Outbound::broadcast(ServerMessage::OpponentLeft));
                metrics::GAMES_ABANDONED_TOTAL.inc();
                Flow::Stop
            }
            Alarm::Countdown(count) => {
                self.deliver(Room::countdown(count));
                self.alarm = Some(if count == 0 {
                    (at + self.timing.go_delay, Alarm::Go)
                } else {
                    (at + self.timing.countdown_step, Alarm::Countdown(count - 1))
                });
                Flow::Continue
            }
            Alarm::Go => {
                match self.room.start(now_millis()) {
                    Ok(out) => {
                        tracing::info!(room = %self.room.id(), "Game started");
                        self.deliver(out);
                        self.started_at = Some(at);
                        self.alarm = Some((at + self.timing.round_cap, Alarm::HardCap));
                        self.publish();
                    }
                    Err(e) => tracing::warn!(room = %self.room.id(), "Cannot start game: {e}"),
                }
                Flow::Continue
            }
            Alarm::HardCap => {
                tracing::info!(room = %self.room.id(), "Round hit its hard cap");
                self.finish("hard_cap")
            }
            Alarm::Reap => {
                tracing::debug!(room = %self.room.id(), "Reaping finished room");
                Flow::Stop
            }
        }
    }

    /// End the round once. Later triggers land on `AlreadyFinished` and are dropped.
    fn finish(&mut self, ended_by: &str) -> Flow {
        match self.room.end() {
            Ok(result) => {
                let outcome = if result.winner.is_some() { "win" } else { "draw" };
                tracing::info!(
                    room = %self.room.id(),
                    winner = ?result.winner,
                    wpm_diff = result.margin.wpm_diff,
                    accuracy_diff = result.margin.accuracy_diff,
                    ended_by,
                    "Game over"
                );
                metrics::GAMES_COMPLETED_TOTAL
                    .with_label_values(&[outcome])
                    .inc();
                if let Some(started) = self.started_at {
                    metrics::GAME_DURATION_SECONDS
                        .with_label_values(&[ended_by])
                        .observe(started.elapsed().as_secs_f64());
                }
                self.deliver(Outbound::broadcast(ServerMessage::GameOver(result)));
                self.alarm = Some((Instant::now() + self.timing.finished_ttl, Alarm::Reap));
                self.publish();
            }
            Err(e) => {
                tracing::debug!(room = %self.room.id(), "Ignoring end request: {e}");
            }
        }
        Flow::Continue
    }

    fn deliver(&self, out: Outbound) {
        for (id, tx) in &self.peers {
            if out.to.includes(id) {
                let _ = tx.send(out.message.clone());
            }
        }
    }

    fn reject(&self, player_id: &str, err: &BattleError) {
        metrics::UPDATES_REJECTED_TOTAL
            .with_label_values(&[metrics::rejection_reason(err)])
            .inc();
        tracing::debug!(room = %self.room.id(), player = %player_id, "Dropped frame: {err}");
    }

    fn publish(&self) {
        self.summary_tx.send_replace(RoomSummary {
            id: self.room.id().to_string(),
            status: self.room.status(),
            players: self.room.players().len(),
        });
    }
}
