use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::interview::driver::{spawn_session, SessionUpdate};
use crate::interview::model::{InterviewMode, Screen};
use crate::interview::remote::{ClientMessage, RemoteDevices, ServerMessage};
use crate::interview::session::SessionOptions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InterviewQuery {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub mode: Option<InterviewMode>,
    #[serde(default)]
    pub screen: Option<Screen>,
}

impl InterviewQuery {
    pub fn into_options(self) -> SessionOptions {
        SessionOptions::new(
            self.role.as_deref().unwrap_or_default(),
            self.mode.unwrap_or(InterviewMode::Text),
            self.screen.unwrap_or(Screen::Live),
        )
    }
}

/// GET /api/v1/interviews/ws?role=&mode=&screen=
/// Upgrades to the interview socket. One socket is one session.
pub async fn handle_interview_socket(
    State(state): State<AppState>,
    Query(query): Query<InterviewQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_interview(socket, state, query))
}

async fn run_interview(socket: WebSocket, state: AppState, query: InterviewQuery) {
    let (sink, stream) = socket.split();
    serve_interview(sink, stream, state, query.into_options()).await;
}

/// Runs one session over a split socket until it ends.
///
/// Outbound order is biased: device commands first, then session updates, then
/// snapshots. When the client stops reading, the session is ended and the loop keeps
/// writing until its summary goes out.
async fn serve_interview<S, R, E>(
    mut sink: S,
    mut stream: R,
    state: AppState,
    options: SessionOptions,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let options = options.with_violation_cooldown(state.config.violation_cooldown);

    let (outbox_tx, mut outbox) = mpsc::unbounded_channel();
    let remote = RemoteDevices::new(outbox_tx);
    let (handle, mut updates, join) =
        spawn_session(options, remote.session_devices(), Arc::clone(&state.ai));
    let id = handle.id();
    info!("Interview {id} connected");

    let mut snapshots = handle.subscribe();

    let mut reader = {
        let handle = handle.clone();
        let remote = Arc::clone(&remote);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            if let Some(event) = remote.translate(message) {
                                if !handle.send(event) {
                                    break;
                                }
                            }
                        }
                        Err(e) => warn!("Interview {id}: ignoring malformed message: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Interview {id}: socket error: {e}");
                        break;
                    }
                }
            }
        })
    };
    drop(remote);

    let initial = ServerMessage::Snapshot {
        snapshot: handle.snapshot(),
    };
    let mut connected = send_message(&mut sink, &initial).await;
    let mut reading = true;

    while connected {
        tokio::select! {
            biased;

            Some(message) = outbox.recv() => {
                connected = send_message(&mut sink, &message).await;
            }
            update = updates.recv() => match update {
                Some(SessionUpdate::Ended(summary)) => {
                    // Release commands were queued before the summary.
                    while let Ok(message) = outbox.try_recv() {
                        send_message(&mut sink, &message).await;
                    }
                    send_message(&mut sink, &ServerMessage::Ended { summary }).await;
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                Some(update) => {
                    connected = send_message(&mut sink, &ServerMessage::from(update)).await;
                }
                None => break,
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                connected = send_message(&mut sink, &ServerMessage::Snapshot { snapshot }).await;
            }
            _ = &mut reader, if reading => {
                info!("Interview {id}: client disconnected");
                reading = false;
                handle.end();
            }
        }
    }

    handle.end();
    reader.abort();
    drop(handle);
    if let Err(e) = join.await {
        warn!("Interview {id}: session task failed: {e}");
    }
    info!("Interview {id} closed");
}

/// Returns false once the socket can no longer be written.
async fn send_message<S>(sink: &mut S, message: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode server message: {e}");
            return true;
        }
    };
    sink.send(Message::Text(text)).await.is_ok()
}
