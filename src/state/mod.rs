// Session state module
//
// SessionManager wraps the Session with thread-safe access using Arc<RwLock<T>>
// and emits change events so front ends can react without polling.

use crate::models::{Session, SessionPhase};
use camino::Utf8PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when the session is modified
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionChange {
    /// A login run has started
    LoginStarted,

    /// Login succeeded
    LoggedIn { username: String },

    /// The session is no longer authenticated (logout, failed login, launch error)
    LoggedOut,

    /// The resolved uploader executable changed
    ToolChanged { tool_path: Option<Utf8PathBuf> },

    UploadStarted,
    UploadFinished,

    /// The human-readable status line changed
    StatusChanged { status: String },
}

/// Thread-safe session state with event emission
///
/// - [`read()`](Self::read) / [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// The phase transitions (`begin_login`, `complete_login`, `abort_login`,
/// `logout`) are the only sanctioned way to move between
/// [`SessionPhase`]s.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: Arc<RwLock<Session>>,
    change_tx: broadcast::Sender<SessionChange>,
}

impl SessionManager {
    /// Create a logged-out session with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(Session::default())),
            change_tx,
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Session> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Session> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Clone of the current session
    pub fn snapshot(&self) -> Session {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the session
    ///
    /// # Example
    /// ```ignore
    /// let logged_in = sessions.read(|session| session.is_authenticated());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        f(&self.read_lock())
    }

    /// Apply `update_fn`, then emit an event for everything that changed
    ///
    /// # Returns
    /// The events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<SessionChange>
    where
        F: FnOnce(&mut Session),
    {
        let changes = {
            let mut state = self.write_lock();
            let old_state = state.clone();
            update_fn(&mut state);
            detect_changes(&old_state, &state)
        };

        for change in &changes {
            // nobody listening is fine
            let _ = self.change_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to session change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.change_tx.subscribe()
    }

    /// Move to `LoggingIn` unless a login is already in flight.
    ///
    /// The check and the transition happen under one write lock.
    ///
    /// # Returns
    /// The phase the session was in before, or `None` if another login
    /// holds the session
    pub fn begin_login(&self) -> Option<SessionPhase> {
        let mut prior = None;
        self.update(|session| {
            if !session.is_logging_in() {
                prior = Some(std::mem::replace(&mut session.phase, SessionPhase::LoggingIn));
            }
        });
        prior
    }

    pub fn complete_login(&self, username: impl Into<String>) -> Vec<SessionChange> {
        let username = username.into();
        self.update(|session| {
            session.phase = SessionPhase::LoggedIn { username };
        })
    }

    /// End a login attempt that did not succeed, returning to `phase`
    /// (normally whatever [`begin_login`](Self::begin_login) returned)
    pub fn abort_login(&self, phase: SessionPhase) -> Vec<SessionChange> {
        self.update(|session| {
            session.phase = phase;
        })
    }

    pub fn logout(&self) -> Vec<SessionChange> {
        self.update(|session| {
            session.phase = SessionPhase::LoggedOut;
            session.uploading = false;
        })
    }

    /// Replace the tool handle wholesale
    pub fn set_tool(&self, tool_path: Option<Utf8PathBuf>) -> Vec<SessionChange> {
        self.update(|session| {
            session.tool_path = tool_path;
        })
    }

    pub fn set_uploading(&self, uploading: bool) -> Vec<SessionChange> {
        self.update(|session| {
            session.uploading = uploading;
        })
    }

    pub fn set_status(&self, status: impl Into<String>) -> Vec<SessionChange> {
        let status = status.into();
        self.update(|session| {
            session.status = status;
        })
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_changes(old: &Session, new: &Session) -> Vec<SessionChange> {
    let mut changes = Vec::new();

    if old.phase != new.phase {
        changes.push(match &new.phase {
            SessionPhase::LoggingIn => SessionChange::LoginStarted,
            SessionPhase::LoggedIn { username } => SessionChange::LoggedIn {
                username: username.clone(),
            },
            SessionPhase::LoggedOut => SessionChange::LoggedOut,
        });
    }

    if old.tool_path != new.tool_path {
        changes.push(SessionChange::ToolChanged {
            tool_path: new.tool_path.clone(),
        });
    }

    if old.uploading != new.uploading {
        changes.push(if new.uploading {
            SessionChange::UploadStarted
        } else {
            SessionChange::UploadFinished
        });
    }

    if old.status != new.status {
        changes.push(SessionChange::StatusChanged {
            status: new.status.clone(),
        });
    }

    changes
}
