use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chat_core::config::ChatConfig;
use chat_core::event::StreamEvent;
use chat_core::model::Message;
use chat_core::reducer::Reducer;
use chat_core::session::SessionStore;
use chat_core::store::SessionDb;
use chat_core::translate::Translator;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::AppError;

/// One frame sent to a session's WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Full resync: everything persisted plus whatever is still streaming.
    Snapshot {
        session_id: String,
        messages: Vec<Message>,
    },
    Event {
        event: StreamEvent,
    },
    /// A user message was appended.
    User {
        message: Message,
    },
}

/// Server-side fold of one session's in-flight stream.
pub struct LiveSession {
    pub reducer: Reducer,
    pub translator: Translator,
    /// Ids this stream created or changed that are not yet persisted.
    pending: Vec<String>,
}

impl LiveSession {
    /// A live fold that starts from the session's persisted messages, so
    /// finalized ones reject further events.
    pub fn seeded(config: &ChatConfig, persisted: Vec<Message>) -> Self {
        let mut reducer = Reducer::new(config.nesting.policy);
        reducer.reset(persisted);
        Self {
            reducer,
            translator: Translator::new(),
            pending: Vec::new(),
        }
    }

    pub fn touch(&mut self, message_id: &str) {
        if !self.pending.iter().any(|p| p == message_id) {
            self.pending.push(message_id.to_string());
        }
    }

    /// Finalized versions of touched messages, in first-touch order. They
    /// leave the pending list; unfinished ones stay.
    pub fn take_finished(&mut self) -> Vec<Message> {
        let reducer = &self.reducer;
        let mut finished = Vec::new();
        self.pending.retain(|id| match reducer.get(id) {
            Some(m) if m.is_finalized() => {
                finished.push(m.clone());
                false
            }
            Some(_) => true,
            None => false,
        });
        finished
    }
}

/// Per-session fan-out point plus its live fold.
///
/// Lock order: a hub's `live` lock may be held while taking the hub map
/// lock, never the reverse (the map side only uses `try_lock`).
pub struct SessionHub {
    pub tx: broadcast::Sender<Frame>,
    pub live: Arc<Mutex<Option<LiveSession>>>,
}

pub type LiveGuard = OwnedMutexGuard<Option<LiveSession>>;

impl SessionHub {
    fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
            live: Arc::new(Mutex::new(None)),
        }
    }

    /// Send to current subscribers; sending with none is not an error.
    pub fn publish(&self, frame: Frame) {
        let _ = self.tx.send(frame);
    }

    /// Nobody is subscribed and no stream is in flight.
    fn is_idle(&self) -> bool {
        self.tx.receiver_count() == 0 && matches!(self.live.try_lock(), Ok(l) if l.is_none())
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: Arc<ChatConfig>,
    pub store: Arc<SessionDb>,
    /// Held only for lookups; each session serializes on its own hub.
    pub hubs: Arc<Mutex<HashMap<String, Arc<SessionHub>>>>,
    /// Fires whenever the session list changes.
    pub event_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Open the session store under `data_dir` as configured.
    pub fn open(data_dir: PathBuf, config: ChatConfig) -> anyhow::Result<Self> {
        let store = SessionDb::open(&config.db_path(&data_dir))?;
        Ok(Self::with_store(data_dir, config, store))
    }

    pub fn with_store(data_dir: PathBuf, config: ChatConfig, store: SessionDb) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            data_dir,
            config: Arc::new(config),
            store: Arc::new(store),
            hubs: Arc::new(Mutex::new(HashMap::new())),
            event_tx: tx,
        }
    }

    pub fn notify_sessions_changed(&self) {
        let _ = self.event_tx.send(());
    }

    /// Run a blocking store call off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&SessionDb) -> chat_core::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        let out = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(AppError::join)??;
        Ok(out)
    }

    /// The hub registered for `id`, if any.
    pub async fn find_hub(&self, id: &str) -> Option<Arc<SessionHub>> {
        self.hubs.lock().await.get(id).cloned()
    }

    /// Lock `id`'s hub, creating it on first use.
    ///
    /// The returned hub is still registered when the guard is handed out,
    /// so frames sent through it reach every later subscriber.
    pub async fn attach(&self, id: &str) -> (Arc<SessionHub>, LiveGuard) {
        loop {
            let hub = self
                .hubs
                .lock()
                .await
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(SessionHub::new(self.config.stream.channel_capacity)))
                .clone();
            let guard = hub.live.clone().lock_owned().await;
            let current = self
                .hubs
                .lock()
                .await
                .get(id)
                .is_some_and(|h| Arc::ptr_eq(h, &hub));
            if current {
                return (hub, guard);
            }
        }
    }

    /// Lock `id`'s hub and make sure it holds a live fold seeded from the store.
    pub async fn attach_live(&self, id: &str) -> Result<(Arc<SessionHub>, LiveGuard), AppError> {
        let (hub, mut guard) = self.attach(id).await;
        if guard.is_none() {
            let sid = id.to_string();
            match self.blocking(move |db| db.fetch_messages(&sid)).await {
                Ok(persisted) => *guard = Some(LiveSession::seeded(&self.config, persisted)),
                Err(e) => {
                    drop(guard);
                    self.release(id, &hub).await;
                    return Err(e);
                }
            }
        }
        Ok((hub, guard))
    }

    /// Drop `id`'s hub when nothing uses it any more.
    pub async fn release(&self, id: &str, hub: &Arc<SessionHub>) {
        let mut hubs = self.hubs.lock().await;
        let same = hubs.get(id).is_some_and(|h| Arc::ptr_eq(h, hub));
        if same && hub.is_idle() {
            hubs.remove(id);
            debug!(session = %id, "session hub released");
        }
    }

    /// Forget a deleted session outright.
    pub async fn forget(&self, id: &str) {
        self.hubs.lock().await.remove(id);
    }

    /// Persisted messages with the live stream's versions laid over them,
    /// in timestamp order.
    pub async fn merged_messages(
        &self,
        live: Option<&LiveSession>,
        id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let sid = id.to_string();
        let mut messages = self.blocking(move |db| db.fetch_messages(&sid)).await?;
        if let Some(live) = live {
            for m in live.reducer.messages() {
                match messages.iter_mut().find(|p| p.id == m.id) {
                    Some(slot) => *slot = m.clone(),
                    None => messages.push(m.clone()),
                }
            }
        }
        // Stable, so equal timestamps keep arrival order.
        messages.sort_by_key(|m| m.timestamp);
        let limit = self.config.stream.history_limit;
        if limit > 0 && messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_store_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), ChatConfig::default()).unwrap();
        assert_eq!(state.data_dir, dir.path());
        assert!(dir.path().join("sessions.redb").exists());
    }

    #[tokio::test]
    async fn idle_hub_is_released() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), ChatConfig::default()).unwrap();

        let (hub, guard) = state.attach("s").await;
        let mut rx = hub.tx.subscribe();
        hub.publish(Frame::Event {
            event: StreamEvent::StreamEnd,
        });
        assert!(matches!(rx.try_recv(), Ok(Frame::Event { .. })));
        drop(guard);

        // A subscriber keeps the hub registered.
        state.release("s", &hub).await;
        assert!(state.find_hub("s").await.is_some());

        drop(rx);
        state.release("s", &hub).await;
        assert!(state.find_hub("s").await.is_none());
    }

    #[tokio::test]
    async fn live_fold_is_seeded_from_the_store() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), ChatConfig::default()).unwrap();
        let session = state.store.create_session("t").unwrap();

        let mut first = Reducer::default();
        first.apply(StreamEvent::text_delta("m1", "Hello"));
        first.apply(StreamEvent::message_complete("m1"));
        state
            .store
            .append_message(&session.id, &first.messages()[0])
            .unwrap();

        let (_hub, mut guard) = state.attach_live(&session.id).await.unwrap();
        let live = (*guard).as_mut().unwrap();
        assert!(live
            .reducer
            .apply(StreamEvent::text_delta("m1", "again"))
            .is_dropped());
        assert!(live.take_finished().is_empty());
        assert_eq!(live.reducer.messages()[0].text(), "Hello");
    }

    #[tokio::test]
    async fn merged_messages_prefers_live_versions() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), ChatConfig::default()).unwrap();
        let session = state.store.create_session("t").unwrap();

        let mut live = LiveSession::seeded(&state.config, Vec::new());
        live.reducer.apply(StreamEvent::text_delta("m1", "partial"));

        let merged = state
            .merged_messages(Some(&live), &session.id)
            .await
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text(), "partial");
    }

    #[tokio::test]
    async fn merged_messages_are_in_timestamp_order() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), ChatConfig::default()).unwrap();
        let session = state.store.create_session("t").unwrap();
        let t0 = chrono::Utc::now();

        let mut live = LiveSession::seeded(&state.config, Vec::new());
        live.reducer.apply(StreamEvent::TextDelta {
            message_id: "a1".into(),
            text: "working".into(),
            timestamp: Some(t0),
        });
        let user = Message {
            id: "u1".into(),
            timestamp: t0 + chrono::Duration::seconds(5),
            body: chat_core::model::MessageBody::User(Default::default()),
        };
        state.store.append_message(&session.id, &user).unwrap();

        let merged = state
            .merged_messages(Some(&live), &session.id)
            .await
            .unwrap();
        let ids: Vec<_> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a1", "u1"]);
    }
}
