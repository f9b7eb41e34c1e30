//! Per-correspondent conversation history with idle expiry.
//!
//! Each correspondent owns one ordered list of turns. Every append re-arms an
//! inactivity timer for that correspondent; when a timer fires without newer
//! activity the history is dropped.
//!
//! Timers are tokio tasks. Arming a new timer aborts the previous task and
//! hands out a fresh [`TimerToken`]; expiry only removes a session whose
//! stored token still matches, so a timer that fired just before an append
//! cannot wipe the fresh history.
//!
//! Each session also carries a [`SessionEpoch`] fixed at creation. A caller
//! that appends after a slow operation (an inference round-trip) passes the
//! epoch it started in; if the session expired meanwhile the append is
//! refused instead of seeding a new session with a dangling turn.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of a conversation, in the shape the inference backend expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Identifies one arming of a correspondent's inactivity timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Identifies one lifetime of a correspondent's session, from creation to expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionEpoch(u64);

struct ArmedTimer {
    token: TimerToken,
    handle: AbortHandle,
}

struct Session {
    epoch: SessionEpoch,
    turns: Vec<Turn>,
    timer: Option<ArmedTimer>,
}

struct StoreInner {
    sessions: DashMap<String, Session>,
    idle_timeout: Duration,
    next_token: AtomicU64,
    next_epoch: AtomicU64,
}

impl StoreInner {
    fn expire(&self, correspondent: &str, token: TimerToken) -> bool {
        self.sessions
            .remove_if(correspondent, |_, session| {
                session.timer.as_ref().is_some_and(|t| t.token == token)
            })
            .is_some()
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        for session in self.sessions.iter() {
            if let Some(timer) = &session.timer {
                timer.handle.abort();
            }
        }
    }
}

/// Concurrency-safe session store.
///
/// Cloning is cheap and yields a handle to the same sessions. Operations on the
/// same correspondent are serialized by the map's per-entry lock. Appending
/// spawns a timer task, so it must run inside a tokio runtime.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sessions: DashMap::new(),
                idle_timeout,
                next_token: AtomicU64::new(0),
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Append a turn, creating the session if needed, and restart its idle timer.
    pub fn append(&self, correspondent: &str, role: Role, text: impl Into<String>) {
        self.append_with(correspondent, Turn::new(role, text), |_| ());
    }

    /// Append a turn and return the session's epoch and resulting history in
    /// one atomic step.
    pub fn append_and_snapshot(
        &self,
        correspondent: &str,
        role: Role,
        text: impl Into<String>,
    ) -> (SessionEpoch, Vec<Turn>) {
        self.append_with(correspondent, Turn::new(role, text), |session| {
            (session.epoch, session.turns.clone())
        })
    }

    /// Append to the session only if it is still the one identified by `epoch`.
    ///
    /// Returns `false`, leaving the store untouched, when the session expired
    /// (or expired and was recreated) since `epoch` was handed out.
    pub fn append_in(
        &self,
        correspondent: &str,
        epoch: SessionEpoch,
        role: Role,
        text: impl Into<String>,
    ) -> bool {
        let Some(mut session) = self.inner.sessions.get_mut(correspondent) else {
            return false;
        };
        if session.epoch != epoch {
            return false;
        }

        self.push_and_rearm(correspondent, &mut session, Turn::new(role, text));
        true
    }

    /// Full ordered history for `correspondent`; empty if there is none.
    pub fn snapshot(&self, correspondent: &str) -> Vec<Turn> {
        self.inner
            .sessions
            .get(correspondent)
            .map(|session| session.turns.clone())
            .unwrap_or_default()
    }

    /// Drop the session if `token` is still its current timer arming.
    ///
    /// Returns `true` if a session was removed.
    pub fn expire(&self, correspondent: &str, token: TimerToken) -> bool {
        self.inner.expire(correspondent, token)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    pub fn contains(&self, correspondent: &str) -> bool {
        self.inner.sessions.contains_key(correspondent)
    }

    /// Current timer token for `correspondent`.
    pub fn timer_token(&self, correspondent: &str) -> Option<TimerToken> {
        self.inner
            .sessions
            .get(correspondent)
            .and_then(|session| session.timer.as_ref().map(|t| t.token))
    }

    fn append_with<R>(&self, correspondent: &str, turn: Turn, f: impl FnOnce(&Session) -> R) -> R {
        // The entry guard is held while the timer is spawned and recorded, so an
        // expiry for the new token cannot observe the session before it carries it.
        let mut session = self
            .inner
            .sessions
            .entry(correspondent.to_string())
            .or_insert_with(|| {
                tracing::debug!(correspondent = %correspondent, "Session created");
                Session {
                    epoch: SessionEpoch(self.inner.next_epoch.fetch_add(1, Ordering::Relaxed)),
                    turns: Vec::new(),
                    timer: None,
                }
            });

        self.push_and_rearm(correspondent, &mut session, turn);
        f(&session)
    }

    fn push_and_rearm(&self, correspondent: &str, session: &mut Session, turn: Turn) {
        let token = TimerToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let handle = self.arm_timer(correspondent.to_string(), token);
        if let Some(previous) = session.timer.replace(ArmedTimer { token, handle }) {
            previous.handle.abort();
        }

        session.turns.push(turn);
    }

    fn arm_timer(&self, correspondent: String, token: TimerToken) -> AbortHandle {
        let store = Arc::downgrade(&self.inner);
        let timeout = self.inner.idle_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let Some(store) = store.upgrade() else {
                return;
            };
            if store.expire(&correspondent, token) {
                tracing::info!(
                    correspondent = %correspondent,
                    idle_secs = timeout.as_secs(),
                    "Chat history reset due to inactivity"
                );
            }
        })
        .abort_handle()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("idle_timeout", &self.inner.idle_timeout)
            .finish()
    }
}
