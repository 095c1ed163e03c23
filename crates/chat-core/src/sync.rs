//! Keeps one client's view of the active session in step with the store.
//!
//! A (re)connect always replaces the local list wholesale with what the
//! store holds; there is no gap detection. Between connects the list only
//! grows through live events. A disconnect freezes it as-is.

use std::fmt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::event::StreamEvent;
use crate::model::Message;
use crate::nesting::NestingPolicy;
use crate::reducer::{Applied, Reducer};
use crate::session::{SessionRecord, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Live,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Live => "live",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SessionSync<S: SessionStore> {
    store: S,
    active: Option<String>,
    reducer: Reducer,
    state: ConnectionState,
    last_error: Option<String>,
}

impl<S: SessionStore> SessionSync<S> {
    pub fn new(store: S, policy: NestingPolicy) -> Self {
        Self::with_reducer(store, Reducer::new(policy))
    }

    pub fn with_reducer(store: S, reducer: Reducer) -> Self {
        Self {
            store,
            active: None,
            reducer,
            state: ConnectionState::Disconnected,
            last_error: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.reducer.messages()
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    /// The most recent store failure, exactly as the store reported it.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Session list from the store. A failure is recorded in `last_error`.
    pub fn sessions(&mut self) -> Result<Vec<SessionRecord>> {
        let result = self.store.list_sessions();
        self.record(result)
    }

    /// Resync the active session from the store and go live.
    ///
    /// On failure the local list is left untouched and the error is kept in
    /// `last_error`. No retry is attempted.
    pub fn connect(&mut self) -> Result<()> {
        let Some(id) = self.active.clone() else {
            debug!("connect without an active session");
            self.state = ConnectionState::Disconnected;
            return Ok(());
        };
        let previous = self.state;
        self.state = ConnectionState::Connecting;
        let fetched = self.store.fetch_messages(&id);
        match self.record(fetched) {
            Ok(messages) => {
                info!(session = %id, messages = messages.len(), "session resynced");
                self.reducer.reset(messages);
                self.state = ConnectionState::Live;
                Ok(())
            }
            Err(e) => {
                self.state = match previous {
                    ConnectionState::Reconnecting => ConnectionState::Reconnecting,
                    _ => ConnectionState::Disconnected,
                };
                Err(e)
            }
        }
    }

    /// Apply a live event. Returns `None` when not live (the event is ignored).
    pub fn on_event(&mut self, event: StreamEvent) -> Option<Applied> {
        if self.state != ConnectionState::Live {
            debug!(event = event.kind(), state = %self.state, "ignoring event while not live");
            return None;
        }
        let terminal = event.is_terminal();
        let applied = self.reducer.apply(event);
        if terminal {
            self.state = ConnectionState::Disconnected;
        }
        Some(applied)
    }

    /// The transport dropped. The list stays exactly as it was.
    pub fn on_disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            warn!(
                session = ?self.active,
                kept = self.reducer.messages().len(),
                "connection lost"
            );
            self.state = ConnectionState::Reconnecting;
        }
    }

    /// Make `id` the active session, clear the local list and connect.
    pub fn switch_session(&mut self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        info!(from = ?self.active, to = %id, "switching session");
        self.active = Some(id);
        self.reducer.reset(Vec::new());
        self.state = ConnectionState::Disconnected;
        self.connect()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Ok(v)
            }
            Err(e) => {
                let msg = e.to_string();
                warn!(error = %msg, "session store call failed");
                self.last_error = Some(msg);
                Err(e)
            }
        }
    }
}
