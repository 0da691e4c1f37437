//! # proletariat
//!
//! Worker agent binary: loads settings, installs logging, registers the
//! job handlers and keeps one agent connected to its manager until ctrl-c
//! or a fatal accounting error.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use proletariat_agent::{Agent, AgentEvent, Executor, HandlerRegistry};
use proletariat_core::ids::{IdSource, SequentialIds, UuidIds};
use proletariat_core::logging::init_subscriber;
use proletariat_settings::AgentSettings;
use proletariat_settings::loader::{load_settings_from_path, settings_path};

/// Proletariat worker agent.
#[derive(Parser, Debug)]
#[command(name = "proletariat", about = "Proletariat worker agent", version)]
struct Cli {
    /// Manager host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Manager port (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Number of execution slots to offer (overrides settings).
    #[arg(long)]
    slots: Option<usize>,

    /// Path to the settings file (default `~/.proletariat/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// How local agent ids are generated before the manager assigns one.
    #[arg(long, value_enum, default_value_t = IdScheme::Sequential)]
    id_scheme: IdScheme,

    /// Handler kind used for jobs without a registered `kind`.
    #[arg(long)]
    default_kind: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum IdScheme {
    Sequential,
    Uuid,
}

impl IdScheme {
    fn source(self) -> Box<dyn IdSource> {
        match self {
            Self::Sequential => Box::new(SequentialIds::new()),
            Self::Uuid => Box::new(UuidIds),
        }
    }
}

impl Cli {
    /// Overlay the flags that were given onto `settings`.
    fn apply_to(&self, settings: &mut AgentSettings) {
        if let Some(ref host) = self.host {
            settings.manager.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.manager.port = port;
        }
        if let Some(slots) = self.slots {
            settings.slots.max = slots;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<AgentSettings> {
    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings(&path)?;
    cli.apply_to(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn load_settings(path: &Path) -> Result<AgentSettings> {
    load_settings_from_path(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn build_registry(default_kind: Option<&str>) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::with_builtins();
    if let Some(kind) = default_kind {
        if !registry.set_fallback(kind) {
            bail!(
                "unknown default kind '{kind}' (registered: {})",
                registry.kinds().join(", ")
            );
        }
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: they carry the log level.
    let settings = resolve_settings(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    let registry = build_registry(cli.default_kind.as_deref())?;
    tracing::info!(
        kinds = ?registry.kinds(),
        fallback = registry.fallback().unwrap_or("-"),
        "handlers registered"
    );

    let ids = cli.id_scheme.source();
    let (agent, mut events) = Agent::new(settings, ids.as_ref());
    agent.start().context("Failed to start agent")?;
    let executor = Executor::new(registry);

    tokio::select! {
        event = executor.run(&mut events) => {
            agent.stop();
            if let Some(AgentEvent::Fatal { message }) = event {
                bail!("agent stopped: {message}");
            }
            tracing::info!("agent gone, exiting");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutting down...");
            agent.stop();
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_override_nothing() {
        let cli = Cli::parse_from(["proletariat"]);
        assert_eq!(cli.id_scheme, IdScheme::Sequential);
        assert!(!cli.json_logs);

        let mut settings = AgentSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings, AgentSettings::default());
    }

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "proletariat",
            "--host",
            "10.0.0.5",
            "--port",
            "2000",
            "--slots",
            "3",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let mut settings = AgentSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.manager.host, "10.0.0.5");
        assert_eq!(settings.manager.port, 2000);
        assert_eq!(settings.slots.max, 3);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_id_scheme_uuid() {
        let cli = Cli::parse_from(["proletariat", "--id-scheme", "uuid"]);
        assert_eq!(cli.id_scheme, IdScheme::Uuid);
        assert!(Cli::try_parse_from(["proletariat", "--id-scheme", "random"]).is_err());
    }

    #[test]
    fn id_schemes_produce_ids() {
        let sequential = IdScheme::Sequential.source();
        assert_eq!(sequential.next_agent_id().as_str(), "1");
        let uuid = IdScheme::Uuid.source();
        assert_eq!(uuid.next_agent_id().as_str().len(), 36);
    }

    #[test]
    fn registry_without_default_kind() {
        let registry = build_registry(None).unwrap();
        assert_eq!(registry.fallback(), None);
        assert!(registry.get("echo").is_some());
    }

    #[test]
    fn registry_with_known_default_kind() {
        let registry = build_registry(Some("echo")).unwrap();
        assert_eq!(registry.fallback(), Some("echo"));
    }

    #[test]
    fn registry_rejects_unknown_default_kind() {
        let err = build_registry(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("unknown default kind 'nope'"));
    }

    #[test]
    fn settings_file_then_flags_then_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"manager": {"port": 4000}, "slots": {"max": 8}}"#).unwrap();

        let cli = Cli::parse_from([
            "proletariat",
            "--settings",
            path.to_str().unwrap(),
            "--slots",
            "0",
        ]);
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.manager.port, 4000);
        // zero slots from the flag is corrected
        assert_eq!(settings.slots.max, 1);
    }

    #[test]
    fn broken_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cli = Cli::parse_from(["proletariat", "--settings", path.to_str().unwrap()]);
        let err = resolve_settings(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }

    #[test]
    fn empty_host_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let cli = Cli::parse_from([
            "proletariat",
            "--settings",
            path.to_str().unwrap(),
            "--host",
            "",
        ]);
        assert!(resolve_settings(&cli).is_err());
    }
}
