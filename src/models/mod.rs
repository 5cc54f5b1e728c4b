//! Data models for steampipe.
//!
//! - [`BuildSpec`] / [`DepotSpec`]: caller-built description of one upload, consumed once
//!   per upload call to generate the app build manifest
//! - [`Session`] / [`SessionPhase`]: authentication state owned by a
//!   [`SessionController`](crate::session::SessionController)
//! - [`Settings`] / [`ToolSource`]: user preferences loaded from `settings.yaml`
//!
//! The models hold no I/O; state updates go through
//! [`SessionManager`](crate::state::SessionManager) so change events are emitted.

pub mod build;
pub mod config;
pub mod session;

pub use build::{BuildSpec, DepotSpec, default_depot_id};
pub use config::{Settings, ToolSource};
pub use session::{Session, SessionPhase};
