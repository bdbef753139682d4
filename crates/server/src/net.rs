//! Network edge: WebSocket transports and the leaderboard endpoint.
//!
//! Each socket runs its own task that forwards inbound frames to the
//! coordinator as `Command`s and writes whatever the coordinator queues on
//! its outbound channel. The coordinator task owns the `Server` outright and
//! maps wall time onto its logical clock.
//!
//! Routes:
//! - GET /ws -> binary protobuf `ClientMessage`/`ServerMessage` frames
//! - GET /leaderboard -> JSON array of `{ username, wins }`

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
    routing::get,
};
use fourline_record::RecordStore;
use prost::Message as _;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::{ConnectionId, Outbound, Server, ServerConfig};

/// Capacity of the coordinator's inbound queue.
const COMMAND_QUEUE: usize = 1024;

/// Event delivered to the coordinator task.
#[derive(Debug)]
pub enum Command {
    /// A transport opened; the coordinator replies with its id.
    Connect {
        outbound: Outbound,
        reply: oneshot::Sender<ConnectionId>,
    },
    Frame {
        connection: ConnectionId,
        bytes: Vec<u8>,
    },
    Close {
        connection: ConnectionId,
    },
}

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct EdgeState {
    commands: mpsc::Sender<Command>,
    store: Arc<dyn RecordStore>,
    leaderboard_limit: usize,
}

#[derive(Debug, Serialize)]
struct LeaderboardRow {
    username: String,
    wins: u64,
}

/// Bind `config.listen` and serve until the listener fails.
pub async fn serve(config: ServerConfig, store: Arc<dyn RecordStore>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
    let state = EdgeState {
        commands,
        store: store.clone(),
        leaderboard_limit: config.leaderboard_limit,
    };
    tokio::spawn(run_coordinator(Server::new(config, store), rx));

    axum::serve(listener, router(state)).await
}

pub fn router(state: EdgeState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .with_state(state)
}

/// Apply commands to `server` in arrival order, firing timers as their
/// deadlines pass. Returns once every command sender is gone.
pub async fn run_coordinator(mut server: Server, mut commands: mpsc::Receiver<Command>) {
    let started = Instant::now();

    loop {
        let deadline = server.next_deadline();
        let wake = time::sleep_until(started + deadline.unwrap_or_default());

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                server.advance_to(started.elapsed());
                match command {
                    Command::Connect { outbound, reply } => {
                        let connection = server.connect(outbound);
                        if reply.send(connection).is_err() {
                            server.disconnect(connection);
                        }
                    }
                    Command::Frame { connection, bytes } => {
                        server.handle_frame(connection, &bytes);
                    }
                    Command::Close { connection } => server.disconnect(connection),
                }
            }
            _ = wake, if deadline.is_some() => {
                server.advance_to(started.elapsed());
            }
        }
    }

    debug!("coordinator stopped");
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<EdgeState>) -> Response {
    ws.on_upgrade(move |socket| connection_task(socket, state))
}

async fn connection_task(mut socket: WebSocket, state: EdgeState) {
    let (outbound, mut queued) = mpsc::unbounded_channel();
    let (reply, assigned) = oneshot::channel();
    if state
        .commands
        .send(Command::Connect { outbound, reply })
        .await
        .is_err()
    {
        return;
    }
    let Ok(connection) = assigned.await else {
        return;
    };

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let bytes = match inbound {
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(connection, error = %e, "socket error");
                        break;
                    }
                };
                if state.commands.send(Command::Frame { connection, bytes }).await.is_err() {
                    break;
                }
            }
            outbound = queued.recv() => {
                let Some(message) = outbound else {
                    break;
                };
                if socket.send(Message::Binary(message.encode_to_vec())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = state.commands.send(Command::Close { connection }).await;
}

async fn leaderboard_handler(
    State(state): State<EdgeState>,
) -> Result<Json<Vec<LeaderboardRow>>, StatusCode> {
    let store = state.store.clone();
    let limit = state.leaderboard_limit;
    let entries = tokio::task::spawn_blocking(move || store.fetch_top_winners(limit))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|e| {
            warn!(error = %e, "leaderboard query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| LeaderboardRow {
                username: entry.username,
                wins: entry.wins,
            })
            .collect(),
    ))
}
