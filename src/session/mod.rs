//! Session controller - login, upload and tool management for one account.
//!
//! [`SessionController`] is the surface a front end talks to. It owns the tool
//! handle and the authentication state, runs `steamcmd` through a
//! [`ProcessRunner`], and reports progress through two observer streams:
//!
//! - **log**: every line the tool prints plus `[OK]` / `[INFO]` / `[WARN]` /
//!   `[ERROR]` lines from the controller itself
//! - **status**: a short human-readable status ("Logging in...", "✓ alice")
//!
//! Both streams are delivered through a [`Dispatcher`](crate::dispatch::Dispatcher),
//! so observers run on the thread that drains it, never on a runtime worker.
//!
//! # Concurrency
//!
//! Callers serialize `login` / `upload` calls. A second `login` while one is in
//! flight is rejected with [`SessionError::LoginInProgress`]; nothing is queued.
//! A launched process is never killed: dropping a `login` or `upload` future
//! only discards its result, and the session falls back to a consistent state.

use crate::dispatch::{DispatcherHandle, ObserverSet, Subscription};
use crate::metrics::Metrics;
use crate::models::{BuildSpec, Session, SessionPhase, Settings, ToolSource};
use crate::services::locator::expected_sdk_layout;
use crate::services::{
    LoginOutcome, ManifestBuilder, ManifestError, ProcessRunner, RunError, RunRequest, RunResult,
    ToolLocator, TokioProcessRunner, UploadOutcome, classify_login, classify_upload, quote_arg,
};
use crate::state::SessionManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that stop a session operation before it produces an outcome.
///
/// Every variant has already been reported to the log and status observers by
/// the time it is returned.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Username is empty")]
    EmptyUsername,

    #[error("steamcmd not found")]
    ToolNotFound,

    #[error("A login is already in progress")]
    LoginInProgress,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error(transparent)]
    Launch(#[from] RunError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

const STATUS_NOT_CONNECTED: &str = "Not connected";
const STATUS_ERROR: &str = "Error";

/// Runs a session transition if the owning operation is abandoned mid-flight.
struct ResetOnDrop<'a, F: FnOnce(&SessionManager)> {
    sessions: &'a SessionManager,
    reset: Option<F>,
}

impl<'a, F: FnOnce(&SessionManager)> ResetOnDrop<'a, F> {
    fn new(sessions: &'a SessionManager, reset: F) -> Self {
        Self {
            sessions,
            reset: Some(reset),
        }
    }

    fn disarm(mut self) {
        self.reset = None;
    }
}

impl<F: FnOnce(&SessionManager)> Drop for ResetOnDrop<'_, F> {
    fn drop(&mut self) {
        if let Some(reset) = self.reset.take() {
            reset(self.sessions);
        }
    }
}

/// Orchestrates `steamcmd` for one account.
pub struct SessionController<R: ProcessRunner = TokioProcessRunner> {
    runner: R,
    dispatcher: DispatcherHandle,
    locator: ToolLocator,
    sessions: SessionManager,
    manifests: ManifestBuilder,
    metrics: Arc<Metrics>,
    log_observers: ObserverSet,
    status_observers: ObserverSet,
}

impl SessionController<TokioProcessRunner> {
    /// Controller running the real tool with the default locator.
    pub fn standard(dispatcher: DispatcherHandle, base_dir: &Utf8Path) -> Self {
        Self::new(TokioProcessRunner::new(), dispatcher, ToolLocator::new(), base_dir)
    }
}

impl<R: ProcessRunner> SessionController<R> {
    /// Create a controller and search for the tool starting at `base_dir`.
    ///
    /// A missing tool is not an error: the controller is usable and every run
    /// operation reports "steamcmd not found" until a location is supplied.
    /// The search result is logged; observers subscribed before the next drain
    /// receive it.
    pub fn new(
        runner: R,
        dispatcher: DispatcherHandle,
        locator: ToolLocator,
        base_dir: &Utf8Path,
    ) -> Self {
        let controller = Self {
            runner,
            dispatcher,
            locator,
            sessions: SessionManager::new(),
            manifests: ManifestBuilder::default(),
            metrics: Arc::new(Metrics::new()),
            log_observers: ObserverSet::new(),
            status_observers: ObserverSet::new(),
        };

        let tool = controller.locator.locate(base_dir);
        match &tool {
            Some(path) => controller.log(format!("[OK] steamcmd found: {}", path)),
            None => {
                controller.log("[WARN] steamcmd not found.");
                controller.log("[INFO] Set the Steamworks SDK folder in Settings.");
            }
        }
        controller.sessions.set_tool(tool);
        controller.sessions.set_status(STATUS_NOT_CONNECTED);

        controller
    }

    pub fn with_manifest_builder(mut self, manifests: ManifestBuilder) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    // Properties

    pub fn is_logged_in(&self) -> bool {
        self.sessions.read(Session::is_authenticated)
    }

    pub fn logged_in_user(&self) -> Option<String> {
        self.sessions.read(|s| s.username().map(str::to_string))
    }

    pub fn is_tool_found(&self) -> bool {
        self.sessions.read(Session::is_tool_found)
    }

    pub fn tool_path(&self) -> Option<Utf8PathBuf> {
        self.sessions.read(|s| s.tool_path.clone())
    }

    pub fn status(&self) -> String {
        self.sessions.read(|s| s.status.clone())
    }

    pub fn snapshot(&self) -> Session {
        self.sessions.snapshot()
    }

    /// Underlying state manager, for subscribing to [`SessionChange`](crate::state::SessionChange)s.
    pub fn state(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn manifest_builder(&self) -> &ManifestBuilder {
        &self.manifests
    }

    // Observers

    /// Receive log lines until the returned subscription is dropped.
    pub fn subscribe_log<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log_observers.subscribe(observer)
    }

    /// Receive status changes until the returned subscription is dropped.
    pub fn subscribe_status<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.status_observers.subscribe(observer)
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.metrics.record_notification();
        self.log_observers.dispatch(&self.dispatcher, message);
    }

    fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.sessions.set_status(status.clone());
        self.metrics.record_notification();
        self.status_observers.dispatch(&self.dispatcher, status);
    }

    fn forward_line(&self, line: &str) {
        self.metrics.record_line_captured();
        self.metrics.record_notification();
        self.log_observers.dispatch(&self.dispatcher, line);
    }

    // Tool location

    /// Point the controller at an SDK folder.
    ///
    /// On failure the previous tool handle is kept.
    ///
    /// # Returns
    /// `true` if `steamcmd.sh` was found under `sdk_folder`
    pub fn set_sdk_folder(&self, sdk_folder: &Utf8Path) -> bool {
        match self.locator.resolve_from_sdk_folder(sdk_folder) {
            Some(path) => {
                self.log(format!("[OK] steamcmd: {}", path));
                self.sessions.set_tool(Some(path));
                true
            }
            None => {
                self.log(format!("[ERROR] steamcmd.sh not found in: {}", sdk_folder));
                self.log(format!("[INFO]  Expected: <sdk>/{}", expected_sdk_layout()));
                false
            }
        }
    }

    /// Use `path` as the tool directly.
    ///
    /// On failure the previous tool handle is kept.
    pub fn set_tool_path(&self, path: &Utf8Path) -> bool {
        match self.locator.resolve_from_direct_path(path) {
            Some(path) => {
                self.log(format!("[OK] steamcmd path: {}", path));
                self.sessions.set_tool(Some(path));
                true
            }
            None => {
                self.log(format!("[ERROR] File not found: {}", path));
                false
            }
        }
    }

    /// Apply the tool location from user settings.
    ///
    /// The SDK folder wins when both locations are set; with neither set the
    /// located tool is kept.
    pub fn apply_settings(&self, settings: &Settings) -> bool {
        match settings.tool_source() {
            ToolSource::SdkFolder(dir) => self.set_sdk_folder(&dir),
            ToolSource::DirectPath(path) => self.set_tool_path(&path),
            ToolSource::Auto => self.is_tool_found(),
        }
    }

    fn require_tool(&self) -> Result<Utf8PathBuf, SessionError> {
        self.tool_path().ok_or_else(|| {
            self.log("[ERROR] steamcmd not found. Set the Steamworks SDK folder in Settings.");
            self.set_status("steamcmd not found");
            SessionError::ToolNotFound
        })
    }

    async fn execute(&self, request: &RunRequest) -> Result<RunResult, SessionError> {
        let sink = |line: &str| self.forward_line(line);

        match self.runner.run(request, &sink).await {
            Ok(result) => {
                self.metrics.record_tool_run(result.duration);
                self.log(format!("[INFO] steamcmd exited with code {}", result.exit_code));
                Ok(result)
            }
            Err(e) => {
                tracing::error!("steamcmd run failed: {}", e);
                self.log(format!("[ERROR] {}", e));
                self.set_status(STATUS_ERROR);
                Err(e.into())
            }
        }
    }

    // Operations

    /// Log in to Steam.
    ///
    /// # Arguments
    /// * `username` - Account name; surrounding whitespace is ignored
    /// * `password` - Account password
    /// * `guard_code` - Steam Guard code, if the account requires one
    ///
    /// # Returns
    /// The classified outcome. A failed login is an `Ok` outcome, not an error;
    /// errors mean the tool never produced output to classify.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        guard_code: Option<&str>,
    ) -> Result<LoginOutcome, SessionError> {
        let username = username.trim();
        if username.is_empty() {
            self.log("[ERROR] Enter a Steam username.");
            self.set_status("Login failed");
            return Err(SessionError::EmptyUsername);
        }

        let tool = self.require_tool()?;

        let Some(prior) = self.sessions.begin_login() else {
            self.log("[WARN] A login is already in progress.");
            return Err(SessionError::LoginInProgress);
        };
        // a rejected or abandoned attempt leaves an existing login intact
        let abandon = ResetOnDrop::new(&self.sessions, move |s: &SessionManager| {
            s.abort_login(prior);
        });

        tracing::info!("Logging in as {}", username);
        self.metrics.record_login_attempt();
        self.set_status("Logging in...");

        let mut args = vec![
            "+login".to_string(),
            quote_arg(username),
            quote_arg(password),
        ];
        let mut request_secrets = vec![2];
        if let Some(code) = guard_code.map(str::trim).filter(|c| !c.is_empty()) {
            request_secrets.push(args.len());
            args.push(code.to_string());
        }
        args.push("+quit".to_string());

        let mut request = RunRequest::for_tool(&tool, args);
        for index in request_secrets {
            request = request.with_secret_arg(index);
        }

        let result = match self.execute(&request).await {
            Ok(result) => result,
            Err(e) => {
                abandon.disarm();
                self.sessions.abort_login(SessionPhase::LoggedOut);
                return Err(e);
            }
        };

        let outcome = classify_login(&result.output, username);
        self.metrics.record_login_result(outcome.is_success());
        match &outcome {
            LoginOutcome::Success { username } => {
                self.sessions.complete_login(username.clone());
                abandon.disarm();
                tracing::info!("Logged in as {}", username);
            }
            other => {
                drop(abandon);
                tracing::warn!("Login failed: {:?}", other);
            }
        }

        self.set_status(outcome.status_text());
        self.log(outcome.log_text());
        Ok(outcome)
    }

    /// Forget the authenticated account. Local only; the tool is not contacted.
    pub fn logout(&self) {
        self.sessions.logout();
        self.set_status(STATUS_NOT_CONNECTED);
        self.log("[INFO] Logged out.");
    }

    /// Generate the app build manifest for `spec` and run `+run_app_build`.
    ///
    /// Rejected without launching anything unless logged in. The session stays
    /// logged in whatever the upload outcome; only a process error logs it out.
    pub async fn upload(&self, spec: &BuildSpec) -> Result<UploadOutcome, SessionError> {
        let Some(username) = self.logged_in_user() else {
            self.log("[ERROR] Please log in first.");
            return Err(SessionError::NotLoggedIn);
        };
        let tool = self.require_tool()?;

        self.metrics.record_upload_attempt();
        self.set_status("Generating VDF...");

        let manifest = match self.manifests.build_upload_manifest(spec) {
            Ok(path) => {
                self.log(format!("[INFO] VDF created: {}", path));
                path
            }
            Err(e) => {
                self.log(format!("[ERROR] VDF generation error: {}", e));
                self.set_status(STATUS_ERROR);
                self.metrics.record_upload_result(false);
                return Err(e.into());
            }
        };

        self.set_status("Uploading...");
        self.sessions.set_uploading(true);
        let uploading = ResetOnDrop::new(&self.sessions, |s: &SessionManager| {
            s.set_uploading(false);
        });

        let request = RunRequest::for_tool(
            &tool,
            vec![
                "+login".to_string(),
                quote_arg(&username),
                "+run_app_build".to_string(),
                quote_arg(manifest.as_str()),
                "+quit".to_string(),
            ],
        );

        let result = self.execute(&request).await;
        drop(uploading);

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.sessions.logout();
                self.metrics.record_upload_result(false);
                return Err(e);
            }
        };

        let outcome = classify_upload(&result.output);
        self.metrics.record_upload_result(outcome.is_success());
        self.log(outcome.log_text());

        let status = match self.logged_in_user() {
            Some(user) => format!("✓ {}", user),
            None => "Ready".to_string(),
        };
        self.set_status(status);

        Ok(outcome)
    }

    /// Upload `content_path` to the default depot of `app_id` (`app_id + 1`).
    ///
    /// `branch` is set live only when `set_live` is true.
    pub async fn upload_simple(
        &self,
        app_id: &str,
        description: &str,
        content_path: &str,
        branch: &str,
        set_live: bool,
    ) -> Result<UploadOutcome, SessionError> {
        let branch = if set_live { branch } else { "" };
        let spec = BuildSpec::simple(app_id, content_path, description, branch);
        self.upload(&spec).await
    }

    /// Run an arbitrary `steamcmd` argument vector through the same log path.
    ///
    /// Session state is not touched.
    pub async fn run_command(&self, args: Vec<String>) -> Result<RunResult, SessionError> {
        let tool = self.require_tool()?;
        let request = RunRequest::for_tool(&tool, args);
        self.execute(&request).await
    }
}

impl<R: ProcessRunner> std::fmt::Debug for SessionController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.sessions.snapshot())
            .field("manifests", &self.manifests)
            .finish_non_exhaustive()
    }
}
