//! Integration tests for steamcmd output classification
//!
//! Classification is substring matching with a fixed rule order; these tests
//! pin the order and check that arbitrary output never fails to classify.

use proptest::prelude::*;
use steampipe::services::classifier::{
    CREDENTIAL_PHRASES, GUARD_CODE_PHRASES, LOGIN_SUCCESS_PHRASES, RATE_LIMIT_PHRASES,
    UPLOAD_ERROR_MARKER, UPLOAD_SUCCESS_PHRASES,
};
use steampipe::services::{LoginOutcome, UploadOutcome, classify_login, classify_upload};

const FRESH_LOGIN: &str = "\
Redirecting stderr to '/home/dev/Steam/logs/stderr.txt'
[  0%] Checking for available updates...
[----] Verifying installation...
Steam Console Client (c) Valve Corporation - version 1716584215
-- type 'quit' to exit --
Loading Steam API...OK
Logging in user 'alice' [U:1:0] to Steam Public...OK
Waiting for client config...OK
Waiting for user info...OK
Unloading Steam API...OK";

const WRONG_PASSWORD: &str = "\
Loading Steam API...OK
Logging in user 'alice' [U:1:0] to Steam Public...FAILED (Invalid Password)
Unloading Steam API...OK";

const UPLOAD_RUN: &str = "\
Logging in user 'alice' to Steam Public...OK
Building depot 481...
Scanning content          120.50MB :   100%
Uploading content 481...
Successfully finished AppID 480 build (BuildID 12345678).";

#[test]
fn test_realistic_transcripts() {
    assert_eq!(
        classify_login(FRESH_LOGIN, "alice"),
        LoginOutcome::Success {
            username: "alice".to_string()
        }
    );
    assert_eq!(
        classify_login(WRONG_PASSWORD, "alice"),
        LoginOutcome::InvalidCredentials
    );
    assert_eq!(classify_upload(UPLOAD_RUN), UploadOutcome::Success);
}

#[test]
fn test_failure_phrase_beats_success_phrase() {
    let output = "Invalid Password\nLogged in OK";
    assert_eq!(classify_login(output, "alice"), LoginOutcome::InvalidCredentials);
}

#[test]
fn test_rule_order_across_all_phrase_sets() {
    for guard in GUARD_CODE_PHRASES {
        for credential in CREDENTIAL_PHRASES {
            let output = format!("{}\n{}\n{}", credential, guard, RATE_LIMIT_PHRASES[0]);
            assert_eq!(classify_login(&output, "alice"), LoginOutcome::InvalidGuardCode);
        }
    }

    for credential in CREDENTIAL_PHRASES {
        for success in LOGIN_SUCCESS_PHRASES {
            let output = format!("{}\n{}\n{}", success, RATE_LIMIT_PHRASES[0], credential);
            assert_eq!(classify_login(&output, "alice"), LoginOutcome::InvalidCredentials);
        }
    }

    for success in LOGIN_SUCCESS_PHRASES {
        let output = format!("{}\n{}", success, RATE_LIMIT_PHRASES[0]);
        assert_eq!(classify_login(&output, "alice"), LoginOutcome::RateLimited);
    }
}

#[test]
fn test_stderr_tags_do_not_change_outcome() {
    let output = "[STDERR] Unable to determine CPU Frequency\nLogged in OK";
    assert!(classify_login(output, "alice").is_success());

    let output = "[STDERR] ERROR! Failed to load script";
    assert!(matches!(classify_upload(output), UploadOutcome::ToolError { .. }));
}

#[test]
fn test_upload_error_marker_is_case_sensitive() {
    assert!(matches!(
        classify_upload("error: lowercase is not the marker"),
        UploadOutcome::Unrecognized { .. }
    ));
    assert!(matches!(
        classify_upload(UPLOAD_ERROR_MARKER),
        UploadOutcome::ToolError { .. }
    ));
}

fn contains_known_phrase(text: &str) -> bool {
    GUARD_CODE_PHRASES
        .iter()
        .chain(CREDENTIAL_PHRASES)
        .chain(RATE_LIMIT_PHRASES)
        .chain(LOGIN_SUCCESS_PHRASES)
        .chain(UPLOAD_SUCCESS_PHRASES)
        .any(|phrase| text.contains(phrase))
        || text.contains(UPLOAD_ERROR_MARKER)
}

proptest! {
    #[test]
    fn prop_unknown_output_is_unrecognized(output in any::<String>()) {
        prop_assume!(!contains_known_phrase(&output));

        prop_assert_eq!(
            classify_login(&output, "alice"),
            LoginOutcome::Unrecognized { raw_output: output.clone() }
        );
        prop_assert_eq!(
            classify_upload(&output),
            UploadOutcome::Unrecognized { raw_output: output.clone() }
        );
    }

    #[test]
    fn prop_classification_is_total(output in ".*", username in "[a-z]{1,12}") {
        let login = classify_login(&output, &username);
        prop_assert!(!login.status_text().is_empty());
        prop_assert!(!classify_upload(&output).log_text().is_empty());

        if let LoginOutcome::Success { username: who } = login {
            prop_assert_eq!(who, username);
        }
    }
}
