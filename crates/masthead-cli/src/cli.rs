//! Command definitions and dispatch for the `masthead` binary.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use masthead_access::{EffectiveRule, PermissionService, TogglePatch};
use masthead_config::{ConfigSaver, HttpsProber, SavePatch, SaveWarning, SaverPorts};
use masthead_data::{
    AssetStore, ExtensionStore, GroupStore, PgProbe, PgStore, SessionStore, run_migrations,
};
use masthead_fsops::{FileArtifactStore, FileCacheStore};
use masthead_telemetry::{LogFormat, LoggingConfig, init_logging};
use sqlx::PgPool;

#[derive(Debug, Parser)]
#[command(name = "masthead", about = "Masthead site administration", version)]
struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "MASTHEAD_DATABASE_URL")]
    database_url: String,

    /// Path of the configuration artifact.
    #[arg(long, env = "MASTHEAD_CONFIG_PATH", default_value = "configuration.json")]
    artifact: PathBuf,

    /// Public hostname used by the HTTPS availability probe.
    #[arg(long, env = "MASTHEAD_SITE_HOST", default_value = "localhost")]
    site_host: String,

    /// Site cache directory.
    #[arg(long, default_value = "cache/site")]
    cache_site_dir: PathBuf,

    /// Admin cache directory.
    #[arg(long, default_value = "cache/admin")]
    cache_admin_dir: PathBuf,

    /// Emit logs as JSON regardless of the build default.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate and persist a configuration patch.
    Save {
        /// Path of the JSON patch document, `-` for stdin.
        #[arg(long, default_value = "-")]
        patch: String,
        /// Acting user id.
        #[arg(long)]
        actor: i64,
    },
    /// Strip the installation root credential from the artifact.
    RemoveRoot,
    /// Edit one permission grant and print the resulting effective state.
    Toggle {
        /// Component asset name, e.g. `com_pages`.
        component: String,
        /// Action name, e.g. `core.edit`.
        action: String,
        /// Group id.
        group: i64,
        /// Edit to apply.
        #[arg(long, value_enum)]
        value: ToggleValue,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ToggleValue {
    /// Grant explicitly.
    Allow,
    /// Deny explicitly.
    Deny,
    /// Revert the pair to inheritance.
    Clear,
    /// Drop the whole action block.
    ClearAction,
}

impl From<ToggleValue> for TogglePatch {
    fn from(value: ToggleValue) -> Self {
        match value {
            ToggleValue::Allow => Self::Set(true),
            ToggleValue::Deny => Self::Set(false),
            ToggleValue::Clear => Self::ClearRule,
            ToggleValue::ClearAction => Self::ClearAction,
        }
    }
}

/// Parses arguments, executes the requested command, and returns the process
/// exit code.
pub(crate) async fn run() -> i32 {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::infer()
    };
    if let Err(err) = init_logging(&LoggingConfig {
        format,
        ..LoggingConfig::default()
    }) {
        eprintln!("error: {err:#}");
        return 1;
    }

    match dispatch(&cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let pool = PgPool::connect(&cli.database_url)
        .await
        .context("failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    let store = Arc::new(PgStore::new(pool));

    match &cli.command {
        Command::Save { patch, actor } => {
            let saver = build_saver(cli, &store)?;
            let raw = read_patch(patch)?;
            let candidate: SavePatch =
                serde_json::from_str(&raw).context("patch document is not valid JSON")?;
            let report = saver.save(candidate, *actor).await?;
            for warning in &report.warnings {
                println!("warning: {}", warning_text(warning));
            }
            println!("configuration saved");
        }
        Command::RemoveRoot => {
            let saver = build_saver(cli, &store)?;
            saver.remove_root_credential().await?;
            println!("root credential removed");
        }
        Command::Toggle {
            component,
            action,
            group,
            value,
        } => {
            let service = PermissionService::new(Arc::clone(&store) as Arc<dyn AssetStore>);
            let state = service
                .toggle(component, action, *group, (*value).into())
                .await?;
            println!("{component} {action} group {group}: {}", state_text(state));
        }
    }
    Ok(())
}

fn build_saver(cli: &Cli, store: &Arc<PgStore>) -> Result<ConfigSaver> {
    let ports = SaverPorts {
        artifact: Arc::new(FileArtifactStore::new(cli.artifact.clone())),
        cache: Arc::new(FileCacheStore::new(
            cli.cache_site_dir.clone(),
            cli.cache_admin_dir.clone(),
        )),
        assets: Arc::clone(store) as Arc<dyn AssetStore>,
        extensions: Arc::clone(store) as Arc<dyn ExtensionStore>,
        sessions: Arc::clone(store) as Arc<dyn SessionStore>,
        groups: Arc::clone(store) as Arc<dyn GroupStore>,
        db_probe: Arc::new(PgProbe),
        ssl_probe: Arc::new(HttpsProber::new().context("failed to build the HTTPS prober")?),
    };
    Ok(ConfigSaver::new(ports, cli.site_host.clone()))
}

fn read_patch(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read patch from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read patch file {source}"))
    }
}

const fn warning_text(warning: &SaveWarning) -> &str {
    match warning {
        SaveWarning::SslUnavailable { .. } => {
            "site not reachable over https, force_ssl disabled"
        }
        SaveWarning::CacheDirUnwritable => "cache directory not writable, caching disabled",
    }
}

const fn state_text(state: EffectiveRule) -> &'static str {
    match state {
        EffectiveRule::AllowedAdmin => "allowed (super administrator)",
        EffectiveRule::Allowed => "allowed",
        EffectiveRule::Denied => "denied",
        EffectiveRule::Conflict => "allowed locally, denied by an ancestor",
        EffectiveRule::Locked => "inherited, locked by an ancestor deny",
        EffectiveRule::NotAllowed => "not allowed (no rule)",
    }
}
