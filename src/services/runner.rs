use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Prefix added to lines the tool wrote to stderr.
pub const STDERR_TAG: &str = "[STDERR] ";

/// Environment override applied to every tool run so the tool does not look
/// for an interactive terminal.
pub const TERMINAL_ENV: (&str, &str) = ("TERM", "xterm");

/// CSI sequences, OSC sequences and two-byte escapes.
static ANSI_ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]|\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)|\x1B[@-_]")
        .expect("Invalid ANSI escape regex")
});

/// Remove terminal escape sequences (colors, cursor movement, titles) from `text`.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE_RE.replace_all(text, "").into_owned()
}

/// Quote an argument that contains whitespace.
///
/// The tool re-tokenizes its command line, so a password with a space has to
/// reach it quoted even when passed as a single argv element.
pub fn quote_arg(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// Callback receiving each sanitized output line as it arrives.
pub type LineSink<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// One subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<Utf8PathBuf>,
    pub env: Vec<(String, String)>,

    /// Indices into `args` that must not be logged.
    pub secret_args: Vec<usize>,
}

impl RunRequest {
    pub fn new(program: impl Into<Utf8PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: Vec::new(),
            secret_args: Vec::new(),
        }
    }

    /// Request for the uploader tool: runs from the tool's own directory with the
    /// terminal override set.
    pub fn for_tool(tool_path: &Utf8Path, args: Vec<String>) -> Self {
        let mut request = Self::new(tool_path, args);
        request.working_dir = tool_path.parent().map(Utf8Path::to_path_buf);
        request
            .env
            .push((TERMINAL_ENV.0.to_string(), TERMINAL_ENV.1.to_string()));
        request
    }

    pub fn with_secret_arg(mut self, index: usize) -> Self {
        self.secret_args.push(index);
        self
    }

    /// Command line for logs, with secret arguments masked.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.to_string()];
        parts.extend(self.args.iter().enumerate().map(|(i, arg)| {
            if self.secret_args.contains(&i) {
                "********".to_string()
            } else {
                arg.clone()
            }
        }));
        parts.join(" ")
    }
}

/// Captured result of a finished subprocess.
///
/// The exit code is informational: the tool exits 0 after some failed logins, so
/// outcomes are classified from `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,

    /// Sanitized stdout and tagged stderr lines joined with `\n`.
    pub output: String,

    pub duration: Duration,
}

impl RunResult {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            duration: Duration::ZERO,
        }
    }
}

/// Errors that keep a run from producing a [`RunResult`]
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs a subprocess to completion, streaming its output.
///
/// Implementations deliver lines to `on_line` in the order each stream produced
/// them and return once the process has exited. There is no cancellation: a
/// started process always runs to completion, dropping the future only discards
/// the result.
pub trait ProcessRunner: Send + Sync {
    fn run(
        &self,
        request: &RunRequest,
        on_line: &LineSink<'_>,
    ) -> impl Future<Output = Result<RunResult, RunError>> + Send;
}

impl<T: ProcessRunner> ProcessRunner for Arc<T> {
    fn run(
        &self,
        request: &RunRequest,
        on_line: &LineSink<'_>,
    ) -> impl Future<Output = Result<RunResult, RunError>> + Send {
        (**self).run(request, on_line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn capture(stream: Stream, raw: &[u8], on_line: &LineSink<'_>, captured: &mut Vec<String>) {
        let decoded = String::from_utf8_lossy(raw);
        let clean = strip_ansi(decoded.trim_end_matches(['\r', '\n']));

        let line = match stream {
            Stream::Stdout => clean,
            Stream::Stderr => format!("{}{}", STDERR_TAG, clean),
        };

        tracing::debug!(target: "steamcmd", "{}", line);
        on_line(&line);
        captured.push(line);
    }
}

impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, request: &RunRequest, on_line: &LineSink<'_>) -> Result<RunResult, RunError> {
        tracing::info!("Executing: {}", request.display_command());
        let start = Instant::now();

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let launch_error = |source| RunError::Launch {
            program: request.program.clone(),
            source,
        };

        let mut child = command.spawn().map_err(launch_error)?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(launch_error(std::io::Error::other(
                "child output pipes were not captured",
            )));
        };

        let mut stdout_lines = BufReader::new(stdout).split(b'\n');
        let mut stderr_lines = BufReader::new(stderr).split(b'\n');
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut captured = Vec::new();

        while stdout_open || stderr_open {
            tokio::select! {
                segment = stdout_lines.next_segment(), if stdout_open => match segment {
                    Ok(Some(raw)) => Self::capture(Stream::Stdout, &raw, on_line, &mut captured),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        tracing::warn!("Failed to read stdout of {}: {}", request.program, e);
                        stdout_open = false;
                    }
                },
                segment = stderr_lines.next_segment(), if stderr_open => match segment {
                    Ok(Some(raw)) => Self::capture(Stream::Stderr, &raw, on_line, &mut captured),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::warn!("Failed to read stderr of {}: {}", request.program, e);
                        stderr_open = false;
                    }
                },
                else => break,
            }
        }

        let status = child.wait().await.map_err(|source| RunError::Wait {
            program: request.program.clone(),
            source,
        })?;

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        tracing::info!(
            "{} completed in {:.2}s with exit code {} ({} lines)",
            request.program,
            duration.as_secs_f32(),
            exit_code,
            captured.len()
        );

        Ok(RunResult {
            exit_code,
            output: captured.join("\n"),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;32mLogged in OK\x1b[0m"), "Logged in OK");
        assert_eq!(strip_ansi("\x1b]0;steamcmd\x07Loading"), "Loading");
        assert_eq!(strip_ansi("plain [text]"), "plain [text]");
        assert_eq!(strip_ansi("\x1b[2K\x1b[1GUploading content"), "Uploading content");
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("alice"), "alice");
        assert_eq!(quote_arg("pass word"), "\"pass word\"");
        assert_eq!(quote_arg("tab\there"), "\"tab\there\"");
    }

    #[test]
    fn test_request_for_tool() {
        let request = RunRequest::for_tool(
            Utf8Path::new("/sdk/builder_linux/steamcmd.sh"),
            vec!["+quit".to_string()],
        );
        assert_eq!(
            request.working_dir,
            Some(Utf8PathBuf::from("/sdk/builder_linux"))
        );
        assert!(request.env.contains(&("TERM".to_string(), "xterm".to_string())));
    }

    #[test]
    fn test_display_command_masks_secrets() {
        let request = RunRequest::new(
            "/usr/bin/steamcmd",
            vec![
                "+login".to_string(),
                "alice".to_string(),
                "hunter2".to_string(),
                "+quit".to_string(),
            ],
        )
        .with_secret_arg(2);

        let shown = request.display_command();
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("********"));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let runner = TokioProcessRunner::new();
        let request = RunRequest::new("/nonexistent/steamcmd.sh", vec![]);
        let result = runner.run(&request, &|_: &str| {}).await;
        assert!(matches!(result, Err(RunError::Launch { .. })));
    }

    #[tokio::test]
    async fn test_sink_can_borrow_local_state() {
        struct Echo;

        impl ProcessRunner for Echo {
            async fn run(&self, request: &RunRequest, on_line: &LineSink<'_>) -> Result<RunResult, RunError> {
                for arg in &request.args {
                    on_line(arg);
                }
                Ok(RunResult::new(0, request.args.join("\n")))
            }
        }

        let runner = Arc::new(Echo);
        let request = RunRequest::new("steamcmd", vec!["+login".to_string(), "+quit".to_string()]);

        let seen = Mutex::new(Vec::new());
        let sink = |line: &str| seen.lock().unwrap().push(line.to_string());
        runner.run(&request, &sink).await.unwrap();

        assert_eq!(seen.into_inner().unwrap(), ["+login", "+quit"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_lines_in_order() {
        let runner = TokioProcessRunner::new();
        let request = RunRequest::new(
            "/bin/sh",
            vec![
                "-c".to_string(),
                "printf '\\033[32mone\\033[0m\\r\\ntwo\\nthree'; echo oops >&2; exit 3".to_string(),
            ],
        );

        let seen = Mutex::new(Vec::new());
        let sink = |line: &str| seen.lock().unwrap().push(line.to_string());
        let result = runner.run(&request, &sink).await.unwrap();

        assert_eq!(result.exit_code, 3);

        let seen = seen.into_inner().unwrap();
        let stdout: Vec<_> = seen.iter().filter(|l| !l.starts_with(STDERR_TAG)).collect();
        assert_eq!(stdout, ["one", "two", "three"]);
        assert!(seen.contains(&"[STDERR] oops".to_string()));

        assert!(result.output.contains("[STDERR] oops"));
        assert_eq!(result.output.lines().count(), 4);
    }
}
