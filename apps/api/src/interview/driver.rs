//! One Tokio task per interview session.
//!
//! The task owns the `InterviewSession` and is the only thing that mutates it. External
//! events (the candidate's socket) and internal completions (AI engine calls, cool-down
//! timers, the camera grant) are multiplexed with the one-second clock in a single
//! `select!` loop, so every transition is serialized.
//!
//! Timers, engine calls and the camera acquisition live in a `JoinSet` that is aborted
//! when the session ends, so nothing outlives the driver waiting on a browser that
//! never answers. A grant that resolves in the same instant as the abort is stopped by
//! the acquiring task itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::ai_client::AiEngine;
use crate::interview::devices::SessionDevices;
use crate::interview::model::{SessionSnapshot, SessionSummary};
use crate::interview::session::{
    Effect, InterviewSession, Notice, SessionEvent, SessionOptions,
};

const TICK: Duration = Duration::from_secs(1);

/// Pushed to whoever presents the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Notice(Notice),
    Ended(SessionSummary),
}

/// Cheap handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queues an event. Returns false once the session has stopped.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn end(&self) {
        self.send(SessionEvent::End);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

/// Starts a session on the current runtime. Dropping every `SessionHandle` tears the
/// session down the same way an explicit end does.
pub fn spawn_session(
    options: SessionOptions,
    devices: SessionDevices,
    engine: Arc<dyn AiEngine>,
) -> (
    SessionHandle,
    mpsc::UnboundedReceiver<SessionUpdate>,
    JoinHandle<()>,
) {
    let session = InterviewSession::new(options, devices);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();

    let handle = SessionHandle {
        id: session.id(),
        events: events_tx,
        snapshots: snapshot_rx,
    };

    let driver = SessionDriver {
        session,
        engine,
        internal_tx,
        snapshot_tx,
        updates_tx,
        tasks: JoinSet::new(),
    };
    let join = tokio::spawn(driver.run(events_rx, internal_rx));

    (handle, updates_rx, join)
}

struct SessionDriver {
    session: InterviewSession,
    engine: Arc<dyn AiEngine>,
    internal_tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    tasks: JoinSet<()>,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut internal: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let id = self.session.id();
        let effects = self.session.start();
        self.execute(effects);
        self.publish();

        let mut clock = interval_at(Instant::now() + TICK, TICK);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("Session {id}: client gone, tearing down");
                        SessionEvent::End
                    }
                },
                Some(event) = internal.recv() => event,
                _ = clock.tick() => SessionEvent::Tick,
                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Session {id}: background task panicked: {e}");
                        }
                    }
                    continue;
                }
            };

            let effects = self.session.handle(event);
            let exited = self.execute(effects);
            self.publish();
            if exited || self.session.is_ended() {
                break;
            }
        }

        self.tasks.abort_all();

        // Completions already queued still get processed, so a camera grant that raced
        // the end is released here rather than leaked.
        internal.close();
        while let Ok(event) = internal.try_recv() {
            self.session.handle(event);
        }
        self.publish();
        debug!("Session {id}: driver stopped");
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }

    /// Runs effects. Returns true when the session exited.
    fn execute(&mut self, effects: Vec<Effect>) -> bool {
        let mut exited = false;
        for effect in effects {
            match effect {
                Effect::AcquireCamera => self.acquire_camera(),
                Effect::AwaitVoiceCatalog => {
                    let ready = self.session.voice_ready_signal();
                    let tx = self.internal_tx.clone();
                    self.tasks.spawn(async move {
                        if ready.wait().await.is_some() {
                            let _ = tx.send(SessionEvent::VoiceReady);
                        }
                    });
                }
                Effect::FetchQuestion { ticket, role } => {
                    let engine = Arc::clone(&self.engine);
                    let tx = self.internal_tx.clone();
                    self.tasks.spawn(async move {
                        let result = engine.get_question(&role).await;
                        let _ = tx.send(SessionEvent::QuestionFetched { ticket, result });
                    });
                }
                Effect::GradeAnswer(job) => {
                    let engine = Arc::clone(&self.engine);
                    let tx = self.internal_tx.clone();
                    self.tasks.spawn(async move {
                        let result = engine.grade_answer(&job.question, &job.user_answer).await;
                        let _ = tx.send(SessionEvent::AnswerGraded {
                            ticket: job.ticket,
                            result,
                        });
                    });
                }
                Effect::ExpireViolation { generation, after } => {
                    let tx = self.internal_tx.clone();
                    self.tasks.spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(SessionEvent::ViolationExpired { generation });
                    });
                }
                Effect::Notify(notice) => {
                    let _ = self.updates_tx.send(SessionUpdate::Notice(notice));
                }
                Effect::Exit(summary) => {
                    let _ = self.updates_tx.send(SessionUpdate::Ended(summary));
                    exited = true;
                }
            }
        }
        exited
    }

    fn acquire_camera(&mut self) {
        let camera = self.session.camera();
        let tx = self.internal_tx.clone();
        let id = self.session.id();
        self.tasks.spawn(async move {
            let result = camera.acquire().await;
            if let Err(mpsc::error::SendError(SessionEvent::CameraResolved(Ok(tracks)))) =
                tx.send(SessionEvent::CameraResolved(result))
            {
                info!("Session {id}: camera granted after teardown, releasing");
                for mut track in tracks {
                    track.stop();
                }
                camera.detach_preview();
            }
        });
    }
}
