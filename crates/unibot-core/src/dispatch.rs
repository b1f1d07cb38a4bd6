//! Per-event orchestration (load, resolve, invoke, save) and the event loop
//! that serializes each user's events.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    domain::UserId,
    handler::Context,
    messaging::{Event, EventKind, Responder},
    routing::{RouteDecision, Router},
    state::{ConversationState, SessionStore},
};

pub const UNRECOGNIZED_ACTION: &str = "Action not recognized";

pub struct Dispatcher {
    router: Arc<Router>,
    store: Arc<dyn SessionStore>,
    responder: Arc<dyn Responder>,
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        store: Arc<dyn SessionStore>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            router,
            store,
            responder,
        }
    }

    /// Handle one event end to end. Failures are logged, never returned.
    pub async fn dispatch(&self, event: Event) {
        let user_id = event.user_id;
        let loaded = match user_id {
            Some(uid) => self.load(uid).await,
            None => None,
        };

        let decision = match &event.kind {
            EventKind::Message { text, .. } => self.router.resolve_by_state(text, loaded.as_ref()),
            EventKind::Callback { id, payload } => match self.router.resolve_callback(payload) {
                Some(handler) => RouteDecision {
                    handler,
                    command: String::new(),
                    args: payload.clone(),
                },
                None => {
                    warn!(user_id = ?user_id.map(|u| u.0), payload = %payload, "no callback handler");
                    if let Err(e) = self
                        .responder
                        .answer_callback(id, Some(UNRECOGNIZED_ACTION))
                        .await
                    {
                        warn!(error = %e, "failed to answer unrecognized callback");
                    }
                    return;
                }
            },
        };

        let now = Utc::now();
        let mut state = loaded.unwrap_or_else(|| ConversationState::new(now));
        let RouteDecision {
            handler,
            command,
            args,
        } = decision;

        debug!(
            user_id = ?user_id.map(|u| u.0),
            command = %command,
            step = %state.step,
            "dispatching"
        );

        let answered = {
            let mut cx = Context::new(
                &event,
                command.clone(),
                args,
                &mut state,
                self.responder.as_ref(),
                now,
            );
            if let Err(e) = handler.handle(&mut cx).await {
                error!(user_id = ?user_id.map(|u| u.0), command = %command, error = %e, "handler failed");
            }
            cx.answered()
        };

        if let EventKind::Callback { id, .. } = &event.kind {
            if !answered {
                if let Err(e) = self.responder.answer_callback(id, None).await {
                    warn!(error = %e, "failed to answer callback");
                }
            }
        }

        if let Some(uid) = user_id {
            state.last_command = command;
            state.last_updated = Utc::now();
            if let Err(e) = self.store.save_state(uid, &state).await {
                error!(user_id = uid.0, error = %e, "failed to save user state");
            }
        }
    }

    /// Read errors mean a fresh flow rather than a stuck user.
    async fn load(&self, user_id: UserId) -> Option<ConversationState> {
        match self.store.get_state(user_id).await {
            Ok(state) => state,
            Err(e) => {
                error!(user_id = user_id.0, error = %e, "failed to load user state");
                None
            }
        }
    }
}

type Lanes = Arc<Mutex<HashMap<UserId, Lane>>>;

struct Lane {
    generation: u64,
    tx: mpsc::UnboundedSender<Event>,
}

/// Feeds events to the dispatcher: one FIFO lane per user, drained by a single
/// worker, so a user's events never overlap while different users run in
/// parallel.
pub struct EventLoop {
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
}

impl EventLoop {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// How long an empty lane waits before its worker retires.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Run until `shutdown` fires or the sender side closes. Events already
    /// accepted into a lane are still dispatched before this returns.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
        let lanes: Lanes = Arc::new(Mutex::new(HashMap::new()));
        let tracker = TaskTracker::new();
        let mut generation = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = events.recv() => {
                    let Some(event) = next else { break };
                    match event.user_id {
                        Some(uid) => {
                            generation += 1;
                            self.enqueue(uid, event, generation, &lanes, &tracker);
                        }
                        None => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            tracker.spawn(async move { dispatcher.dispatch(event).await });
                        }
                    }
                }
            }
        }

        info!("event loop stopping; draining in-flight events");
        // Dropping the senders lets each worker finish its backlog and exit.
        match lanes.lock() {
            Ok(mut map) => map.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        tracker.close();
        tracker.wait().await;
        info!("event loop stopped");
    }

    fn enqueue(
        &self,
        user_id: UserId,
        event: Event,
        generation: u64,
        lanes: &Lanes,
        tracker: &TaskTracker,
    ) {
        let mut map = match lanes.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };

        let event = match map.get(&user_id) {
            Some(lane) => match lane.tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // Fresh channel with its receiver in hand; this send cannot fail.
        let _ = tx.send(event);
        map.insert(user_id, Lane { generation, tx });
        debug!(user_id = user_id.0, "lane opened");

        let worker = LaneWorker {
            user_id,
            generation,
            rx,
            lanes: Arc::clone(lanes),
            dispatcher: Arc::clone(&self.dispatcher),
            idle_timeout: self.idle_timeout,
        };
        tracker.spawn(worker.run());
    }
}

struct LaneWorker {
    user_id: UserId,
    generation: u64,
    rx: mpsc::UnboundedReceiver<Event>,
    lanes: Lanes,
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
}

impl LaneWorker {
    async fn run(mut self) {
        loop {
            match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
                Ok(Some(event)) => self.dispatcher.dispatch(event).await,
                Ok(None) => break,
                Err(_) => {
                    if self.retire() {
                        break;
                    }
                }
            }
        }
        debug!(user_id = self.user_id.0, "lane closed");
    }

    /// Unregister the lane if nothing slipped in. Sends happen under the same
    /// lock, so an empty queue here stays empty.
    fn retire(&self) -> bool {
        let mut map = match self.lanes.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !self.rx.is_empty() {
            return false;
        }
        if map
            .get(&self.user_id)
            .is_some_and(|lane| lane.generation == self.generation)
        {
            map.remove(&self.user_id);
        }
        true
    }
}
