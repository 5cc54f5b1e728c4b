//! Services module - the parts of steampipe that talk to the outside world.
//!
//! Everything here is independent of how results are displayed: no observer or
//! dispatcher types appear in these signatures, so each piece can be tested on
//! its own.
//!
//! # Components
//!
//! - [`ToolLocator`]: finds `steamcmd` in the conventional Steamworks SDK layouts,
//!   falling back to a `PATH` lookup
//! - [`ProcessRunner`] / [`TokioProcessRunner`]: runs the tool, streaming
//!   ANSI-stripped output lines to a callback while capturing the full text
//! - [`classify_login`] / [`classify_upload`]: map captured output to
//!   [`LoginOutcome`] / [`UploadOutcome`] using ordered phrase rules
//! - [`ManifestBuilder`]: writes the `app_build` / `depot_build` VDF documents
//!   passed to `+run_app_build`, and [`parse_manifest`] reads them back
//!
//! # Usage Example
//!
//! ```ignore
//! use steampipe::services::{ManifestBuilder, ProcessRunner, RunRequest, TokioProcessRunner};
//!
//! let manifest = ManifestBuilder::default().build_upload_manifest(&spec)?;
//! let request = RunRequest::for_tool(&tool, vec![
//!     "+login".into(), user.into(),
//!     "+run_app_build".into(), manifest.to_string(),
//!     "+quit".into(),
//! ]);
//! let result = TokioProcessRunner::new().run(&request, &|line| println!("{line}")).await?;
//! let outcome = steampipe::services::classify_upload(&result.output);
//! ```

pub mod classifier;
pub mod locator;
pub mod manifest;
pub mod runner;

pub use classifier::{LoginOutcome, UploadOutcome, classify_login, classify_upload};
pub use locator::ToolLocator;
pub use manifest::{
    ManifestBuilder, ManifestError, ManifestParseError, VdfDocument, VdfNode, parse_manifest,
    read_manifest,
};
pub use runner::{
    LineSink, ProcessRunner, RunError, RunRequest, RunResult, TokioProcessRunner, quote_arg,
    strip_ansi,
};
