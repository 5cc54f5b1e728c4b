//! steampipe - command-line front end
//!
//! Runs the session controller headless: the main thread owns the
//! [`Dispatcher`] and drains it every tick while an operation is awaited,
//! printing log lines and status changes as they arrive.
//!
//! # Threading
//!
//! - **Main thread**: drives the operation future with `block_on` and drains
//!   the dispatcher, so observers always run here
//! - **Tokio workers**: steamcmd I/O
//!
//! # Commands
//!
//! - `locate`: print where steamcmd was found
//! - `login`: check credentials with a `+login ... +quit` run
//! - `upload`: log in, write the app build manifest, run `+run_app_build`
//! - `manifest`: write the app build manifest only
//! - `settings {show,set-sdk,set-tool,reset}`: inspect or edit saved settings
//!
//! Missing build arguments fall back to the saved settings (`last_app_id`,
//! `default_content_path`, `last_branch`, ...).

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use std::future::Future;
use steampipe::dispatch::DEFAULT_TICK;
use steampipe::logging::{self, LogOptions};
use steampipe::services::locator::expected_sdk_layout;
use steampipe::services::{ManifestBuilder, ToolLocator};
use steampipe::{
    APP_NAME, BuildSpec, ConfigManager, DepotSpec, Dispatcher, SessionController, Settings,
    Subscription, VERSION,
};

#[derive(Parser)]
#[command(name = "steampipe")]
#[command(version)]
#[command(about = "Generate SteamPipe build manifests and upload them with steamcmd", long_about = None)]
struct Cli {
    #[arg(long, short = 'd', global = true, help = "debug log level, includes every steamcmd line")]
    debug: bool,

    #[arg(long, short = 'v', global = true, help = "mirror the log file to stderr")]
    verbose: bool,

    #[arg(long, global = true, help = "write the log file as JSON lines")]
    log_json: bool,

    #[arg(long, global = true, value_name = "DIR", help = "settings directory")]
    config_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true, value_name = "DIR", help = "directory the steamcmd search starts from")]
    base_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the steamcmd executable that would be used
    Locate,

    /// Log in once to check credentials (and cache them in steamcmd)
    Login(LoginArgs),

    /// Log in, generate the app build manifest and upload it
    Upload {
        #[command(flatten)]
        login: LoginArgs,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Generate the app build manifest without uploading
    Manifest {
        #[command(flatten)]
        build: BuildArgs,

        #[arg(long, short, value_name = "DIR", help = "output directory (default: process temp dir)")]
        out: Option<Utf8PathBuf>,
    },

    /// Show or change saved settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long, short, help = "Steam account (default: last used)")]
    username: Option<String>,

    #[arg(long, short, env = "STEAM_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, short, value_name = "CODE", help = "Steam Guard code")]
    guard_code: Option<String>,
}

#[derive(Args)]
struct BuildArgs {
    #[arg(long, short, value_name = "ID")]
    app_id: Option<String>,

    #[arg(long, short, value_name = "DIR", help = "content root (default: saved content path)")]
    content: Option<Utf8PathBuf>,

    #[arg(long, default_value = "", help = "build description")]
    description: String,

    #[arg(long, short, help = "branch to set live (default: saved branch)")]
    branch: Option<String>,

    #[arg(long, help = "set the build live on the branch")]
    set_live: bool,

    #[arg(long, help = "preview build, nothing is uploaded")]
    preview: bool,

    #[arg(long = "depot", value_name = "ID=PATH", help = "explicit depot mapping, repeatable (default: app id + 1)")]
    depots: Vec<String>,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings
    Show,

    /// Save the Steamworks SDK folder
    SetSdk { dir: Utf8PathBuf },

    /// Save a direct path to steamcmd
    SetTool { path: Utf8PathBuf },

    /// Delete the settings file
    Reset,
}

/// Runtime, dispatcher and controller for one command.
struct Console {
    runtime: tokio::runtime::Runtime,
    dispatcher: Dispatcher,
    controller: SessionController,
    _subscriptions: [Subscription; 2],
}

impl Console {
    fn open(base_dir: &Utf8Path, settings: &Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("steampipe-worker")
            .build()
            .context("Failed to create tokio runtime")?;

        let dispatcher = Dispatcher::new();
        let controller = SessionController::standard(dispatcher.handle(), base_dir);

        let subscriptions = [
            controller.subscribe_log(|line| println!("{}", line)),
            controller.subscribe_status(|status| println!("== {}", status)),
        ];

        controller.apply_settings(settings);
        dispatcher.drain();

        Ok(Self {
            runtime,
            dispatcher,
            controller,
            _subscriptions: subscriptions,
        })
    }

    /// Await `future` on the main thread, draining notifications every tick.
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime
            .block_on(self.dispatcher.run_until(future, DEFAULT_TICK))
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.dispatcher.drain();
        self.controller.metrics().log_summary();
    }
}

fn default_base_dir() -> Result<Utf8PathBuf> {
    let exe = std::env::current_exe().context("Failed to resolve the executable path")?;
    let exe = Utf8PathBuf::try_from(exe).context("Executable path is not UTF-8")?;
    Ok(exe
        .parent()
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| Utf8PathBuf::from(".")))
}

fn parse_depot(value: &str) -> Result<DepotSpec> {
    let (id, path) = value
        .split_once('=')
        .with_context(|| format!("Expected ID=PATH, got '{}'", value))?;
    Ok(DepotSpec::new(id.trim(), path.trim()))
}

fn build_spec(args: &BuildArgs, settings: &Settings) -> Result<BuildSpec> {
    let app_id = args
        .app_id
        .clone()
        .unwrap_or_else(|| settings.last_app_id.clone());
    let content = args
        .content
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| settings.default_content_path.clone());

    let set_live = args.set_live || settings.set_live_after_upload;
    let branch = match (&args.branch, set_live) {
        (_, false) => String::new(),
        (Some(branch), true) => branch.clone(),
        (None, true) => settings.last_branch.clone(),
    };

    let mut spec = if args.depots.is_empty() {
        BuildSpec::simple(app_id, content, args.description.clone(), branch)
    } else {
        BuildSpec {
            app_id,
            description: args.description.clone(),
            content_root: content,
            branch,
            preview: false,
            depots: args
                .depots
                .iter()
                .map(|d| parse_depot(d))
                .collect::<Result<Vec<_>>>()?,
        }
    };
    spec.preview = args.preview;

    Ok(spec)
}

fn run_settings(config: &ConfigManager, mut settings: Settings, action: SettingsAction) -> Result<()> {
    let locator = ToolLocator::new();

    match action {
        SettingsAction::Show => {
            println!("# {}", config.settings_path());
            print!(
                "{}",
                serde_yaml_ng::to_string(&settings).context("Failed to serialize settings")?
            );
        }
        SettingsAction::SetSdk { dir } => {
            let Some(tool) = locator.resolve_from_sdk_folder(&dir) else {
                bail!(
                    "steamcmd.sh not found in: {} (expected <sdk>/{})",
                    dir,
                    expected_sdk_layout()
                );
            };
            settings.sdk_folder = dir.to_string();
            config.save_settings(&settings)?;
            println!("[OK] steamcmd: {}", tool);
        }
        SettingsAction::SetTool { path } => {
            if locator.resolve_from_direct_path(&path).is_none() {
                bail!("File not found: {}", path);
            }
            settings.steamcmd_path = path.to_string();
            config.save_settings(&settings)?;
            println!("[OK] steamcmd path: {}", path);
        }
        SettingsAction::Reset => {
            config.reset()?;
            println!("Settings reset: {}", config.settings_path());
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => ConfigManager::default_dir()?,
    };
    let config = ConfigManager::new(&config_dir)?;
    let mut settings = config.load_settings()?;

    let log_dir = config_dir.join("logs");
    let _guard = logging::init(&LogOptions {
        debug: cli.debug || settings.debug_mode,
        console: cli.verbose,
        json: cli.log_json,
        ..LogOptions::new(&log_dir, APP_NAME)
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let base_dir = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => default_base_dir()?,
    };

    match cli.command {
        Commands::Locate => {
            let console = Console::open(&base_dir, &settings)?;
            match console.controller.tool_path() {
                Some(path) => println!("{}", path),
                None => bail!("steamcmd not found"),
            }
        }

        Commands::Login(args) => {
            let username = args.username.unwrap_or_else(|| settings.last_username.clone());
            let console = Console::open(&base_dir, &settings)?;

            let outcome = console.block_on(console.controller.login(
                &username,
                &args.password,
                args.guard_code.as_deref(),
            ))?;
            if !outcome.is_success() {
                bail!("{}", outcome.status_text());
            }

            settings.last_username = username.trim().to_string();
            config.save_settings(&settings)?;
        }

        Commands::Upload { login, build } => {
            let spec = build_spec(&build, &settings)?;
            let username = login.username.unwrap_or_else(|| settings.last_username.clone());
            let console = Console::open(&base_dir, &settings)?;
            let controller = &console.controller;

            let outcome = console.block_on(async {
                let login_outcome = controller
                    .login(&username, &login.password, login.guard_code.as_deref())
                    .await?;
                if !login_outcome.is_success() {
                    bail!("{}", login_outcome.status_text());
                }
                Ok::<_, anyhow::Error>(controller.upload(&spec).await?)
            })?;

            settings.last_username = username.trim().to_string();
            settings.last_app_id = spec.app_id.clone();
            if !spec.branch.is_empty() {
                settings.last_branch = spec.branch.clone();
            }
            config.save_settings(&settings)?;

            if !outcome.is_success() {
                bail!("{}", outcome.log_text());
            }
        }

        Commands::Manifest { build, out } => {
            let spec = build_spec(&build, &settings)?;
            let builder = out.map(ManifestBuilder::new).unwrap_or_default();
            let path = builder.build_upload_manifest(&spec)?;
            println!("{}", path);
        }

        Commands::Settings { action } => run_settings(&config, settings, action)?,
    }

    tracing::info!("{} finished", APP_NAME);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_args() -> BuildArgs {
        BuildArgs {
            app_id: None,
            content: None,
            description: String::new(),
            branch: None,
            set_live: false,
            preview: false,
            depots: Vec::new(),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_spec_uses_saved_settings() {
        let settings = Settings {
            last_app_id: "480".to_string(),
            default_content_path: "/builds/game".to_string(),
            last_branch: "beta".to_string(),
            set_live_after_upload: true,
            ..Settings::default()
        };

        let spec = build_spec(&build_args(), &settings).unwrap();
        assert_eq!(spec.app_id, "480");
        assert_eq!(spec.content_root, "/builds/game");
        assert_eq!(spec.branch, "beta");
        assert_eq!(spec.depots[0].id, "481");
    }

    #[test]
    fn test_branch_ignored_unless_set_live() {
        let args = BuildArgs {
            app_id: Some("480".to_string()),
            branch: Some("beta".to_string()),
            ..build_args()
        };
        let spec = build_spec(&args, &Settings::default()).unwrap();
        assert!(spec.branch.is_empty());
    }

    #[test]
    fn test_explicit_depots() {
        let args = BuildArgs {
            app_id: Some("480".to_string()),
            depots: vec!["481=/builds/linux".to_string(), "482 = /builds/win".to_string()],
            ..build_args()
        };
        let spec = build_spec(&args, &Settings::default()).unwrap();
        assert_eq!(spec.depots.len(), 2);
        assert_eq!(spec.depots[1].id, "482");
        assert_eq!(spec.depots[1].source_content_path, "/builds/win");

        let bad = BuildArgs {
            depots: vec!["481".to_string()],
            ..build_args()
        };
        assert!(build_spec(&bad, &Settings::default()).is_err());
    }
}
