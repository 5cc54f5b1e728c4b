use camino::Utf8PathBuf;

/// Authentication phase of a session.
///
/// Only the login and logout operations move a session between phases; an
/// upload never changes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    LoggedOut,
    LoggingIn,
    LoggedIn {
        username: String,
    },
}

/// Single source of truth for one controller's session.
///
/// `Session` is wrapped in `Arc<RwLock<Session>>` by
/// [`SessionManager`](crate::state::SessionManager); go through its methods so
/// change events are emitted.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub phase: SessionPhase,

    /// Resolved uploader executable, `None` while no tool was found.
    pub tool_path: Option<Utf8PathBuf>,

    /// Transient flag while a build-and-upload run is in flight.
    pub uploading: bool,

    /// Last human-readable status line.
    pub status: String,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::LoggedIn { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::LoggedIn { username } => Some(username),
            _ => None,
        }
    }

    pub fn is_logging_in(&self) -> bool {
        self.phase == SessionPhase::LoggingIn
    }

    pub fn is_tool_found(&self) -> bool {
        self.tool_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_logged_out() {
        let session = Session::default();
        assert!(!session.is_authenticated());
        assert!(!session.is_logging_in());
        assert!(!session.is_tool_found());
        assert_eq!(session.username(), None);
    }

    #[test]
    fn test_logged_in_username() {
        let session = Session {
            phase: SessionPhase::LoggedIn {
                username: "alice".to_string(),
            },
            ..Session::default()
        };
        assert!(session.is_authenticated());
        assert_eq!(session.username(), Some("alice"));
    }
}
