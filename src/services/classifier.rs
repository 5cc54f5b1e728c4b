//! Classify captured uploader output into typed outcomes.
//!
//! The uploader has no machine-readable output mode and its wording changes
//! between versions, so classification is substring matching over known phrase
//! sets. Anything that matches no rule is [`LoginOutcome::Unrecognized`] /
//! [`UploadOutcome::Unrecognized`], which is a normal result and not an error.

/// Phrases reported for a wrong or expired two-factor code.
pub const GUARD_CODE_PHRASES: &[&str] = &[
    "Two-factor code mismatch",
    "Invalid Steam Guard",
    "Invalid authenticator code",
];

/// Phrases reported for a wrong account name or password.
pub const CREDENTIAL_PHRASES: &[&str] = &["Invalid Password", "FAILED login"];

/// Phrases reported when the account is temporarily locked out.
pub const RATE_LIMIT_PHRASES: &[&str] = &["Too many login failures"];

/// Phrases seen on a successful login. "Logged in OK" only shows up with cached
/// credentials; a fresh login ends with "Unloading Steam API".
pub const LOGIN_SUCCESS_PHRASES: &[&str] =
    &["Logged in OK", "Login Successful", "Unloading Steam API"];

/// Phrases printed while a build is being processed.
pub const UPLOAD_SUCCESS_PHRASES: &[&str] = &["Building depot", "Uploading content"];

/// Marker the uploader prints in front of its own error messages.
pub const UPLOAD_ERROR_MARKER: &str = "ERROR";

/// Outcome of a login run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success { username: String },
    InvalidGuardCode,
    InvalidCredentials,
    RateLimited,
    Unrecognized { raw_output: String },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }

    /// Short status line for the status sink.
    pub fn status_text(&self) -> String {
        match self {
            LoginOutcome::Success { username } => format!("✓ {}", username),
            LoginOutcome::InvalidGuardCode => "Steam Guard error".to_string(),
            LoginOutcome::InvalidCredentials => "Login failed".to_string(),
            LoginOutcome::RateLimited => "Too many attempts".to_string(),
            LoginOutcome::Unrecognized { .. } => "Login failed (unexpected response)".to_string(),
        }
    }

    /// Log line explaining the outcome.
    pub fn log_text(&self) -> &'static str {
        match self {
            LoginOutcome::Success { .. } => "[OK] Login successful.",
            LoginOutcome::InvalidGuardCode => "[ERROR] Invalid Steam Guard code.",
            LoginOutcome::InvalidCredentials => "[ERROR] Invalid username or password.",
            LoginOutcome::RateLimited => {
                "[ERROR] Steam temporarily blocked login. Wait a few minutes."
            }
            LoginOutcome::Unrecognized { .. } => {
                "[WARN] Unexpected steamcmd response. Check the log above."
            }
        }
    }
}

/// Outcome of a build-and-upload run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    ToolError { raw_output: String },
    Unrecognized { raw_output: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success)
    }

    pub fn log_text(&self) -> &'static str {
        match self {
            UploadOutcome::Success => "[OK] Upload complete.",
            UploadOutcome::ToolError { .. } => {
                "[ERROR] steamcmd returned an error. Check the log above."
            }
            UploadOutcome::Unrecognized { .. } => {
                "[WARN] Could not confirm the upload from steamcmd output. Check the log above."
            }
        }
    }
}

fn contains_any(output: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| output.contains(phrase))
}

/// Classify the output of a login run.
///
/// Failure phrases are checked before success phrases because the uploader
/// prints "Unloading Steam API" on its way out even after a failed login.
/// `username` is the account the caller logged in with; it is not parsed from
/// the output.
pub fn classify_login(output: &str, username: &str) -> LoginOutcome {
    if contains_any(output, GUARD_CODE_PHRASES) {
        LoginOutcome::InvalidGuardCode
    } else if contains_any(output, CREDENTIAL_PHRASES) {
        LoginOutcome::InvalidCredentials
    } else if contains_any(output, RATE_LIMIT_PHRASES) {
        LoginOutcome::RateLimited
    } else if contains_any(output, LOGIN_SUCCESS_PHRASES) {
        LoginOutcome::Success {
            username: username.to_string(),
        }
    } else {
        LoginOutcome::Unrecognized {
            raw_output: output.to_string(),
        }
    }
}

/// Classify the output of a build-and-upload run.
pub fn classify_upload(output: &str) -> UploadOutcome {
    if contains_any(output, UPLOAD_SUCCESS_PHRASES) {
        UploadOutcome::Success
    } else if output.contains(UPLOAD_ERROR_MARKER) {
        UploadOutcome::ToolError {
            raw_output: output.to_string(),
        }
    } else {
        UploadOutcome::Unrecognized {
            raw_output: output.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_success_phrases() {
        for phrase in LOGIN_SUCCESS_PHRASES {
            let output = format!("Redirecting stderr\n{}\n", phrase);
            assert_eq!(
                classify_login(&output, "alice"),
                LoginOutcome::Success {
                    username: "alice".to_string()
                }
            );
        }
    }

    #[test]
    fn test_guard_code_beats_everything() {
        let output = "Invalid Password\nTwo-factor code mismatch\nUnloading Steam API";
        assert_eq!(classify_login(output, "bob"), LoginOutcome::InvalidGuardCode);
    }

    #[test]
    fn test_credentials_beat_success() {
        let output = "Logging in user 'bob'...\nInvalid Password\nLogged in OK";
        assert_eq!(classify_login(output, "bob"), LoginOutcome::InvalidCredentials);

        let output = "FAILED login with result code InvalidPassword\nUnloading Steam API...";
        assert_eq!(classify_login(output, "bob"), LoginOutcome::InvalidCredentials);
    }

    #[test]
    fn test_rate_limited() {
        let output = "Too many login failures, please wait\nUnloading Steam API";
        assert_eq!(classify_login(output, "bob"), LoginOutcome::RateLimited);
    }

    #[test]
    fn test_unrecognized_login_keeps_output() {
        let outcome = classify_login("Connecting anonymously", "bob");
        assert_eq!(
            outcome,
            LoginOutcome::Unrecognized {
                raw_output: "Connecting anonymously".to_string()
            }
        );
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_upload_rules() {
        assert_eq!(classify_upload("Building depot 481..."), UploadOutcome::Success);
        assert_eq!(
            classify_upload("Uploading content 481... ERROR retrying"),
            UploadOutcome::Success
        );
        assert!(matches!(
            classify_upload("ERROR! Failed to load app build script"),
            UploadOutcome::ToolError { .. }
        ));
        assert!(matches!(classify_upload(""), UploadOutcome::Unrecognized { .. }));
    }

    #[test]
    fn test_status_texts_are_distinct() {
        let outcomes = [
            LoginOutcome::Success {
                username: "alice".to_string(),
            },
            LoginOutcome::InvalidGuardCode,
            LoginOutcome::InvalidCredentials,
            LoginOutcome::RateLimited,
            LoginOutcome::Unrecognized {
                raw_output: String::new(),
            },
        ];

        let statuses: std::collections::HashSet<_> =
            outcomes.iter().map(LoginOutcome::status_text).collect();
        let logs: std::collections::HashSet<_> =
            outcomes.iter().map(LoginOutcome::log_text).collect();
        assert_eq!(statuses.len(), outcomes.len());
        assert_eq!(logs.len(), outcomes.len());
    }
}
