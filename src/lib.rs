// steampipe - SteamPipe build manifests and steamcmd upload orchestration
//
// This is the library crate with the session controller, the steamcmd
// services and the dispatcher. The binary crate (main.rs) provides the
// command-line front end.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod session;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use dispatch::{Dispatcher, DispatcherHandle, ObserverSet, Subscription};
pub use metrics::Metrics;
pub use models::{BuildSpec, DepotSpec, Session, SessionPhase, Settings};
pub use session::{SessionController, SessionError};
pub use state::{SessionChange, SessionManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
