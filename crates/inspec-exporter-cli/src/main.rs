use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inspec_exporter_core::{
    run_scrape, ExporterSettings, ExporterStats, InspecAuditor, ModuleConfig, ScrapeRequest,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod server;
mod settings;

use server::AppState;
use settings::{locate_binary, normalize_listen_address, SettingsSource, SettingsStore};

#[derive(Parser, Debug)]
#[command(
    name = "inspec-exporter",
    author,
    version,
    about = "Prometheus exporter that runs InSpec profiles on demand"
)]
struct Cli {
    /// Configuration file; defaults to `inspec_exporter.{yaml,toml,json}` in
    /// `.`, `/etc/inspec_exporter/` or `$HOME/.inspec_exporter`
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG (e.g. `debug`)
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve `/inspec` scrapes and the exporter's own `/metrics`
    Serve {
        /// Address to listen on, e.g. `:9124` or `127.0.0.1:9124`
        #[arg(long = "listen-address", value_name = "ADDR")]
        listen_address: Option<String>,
    },
    /// Run a single scrape and print the exposition to stdout
    Scrape {
        /// Host to audit over SSH; omit to audit the local machine
        #[arg(long, default_value = "")]
        target: String,
        /// Module to run; omit to run every profile
        #[arg(long, default_value = "")]
        module: String,
    },
    /// List the module configurations resolved from the profile directory
    Modules {
        /// Emit modules as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let source = SettingsSource::new(cli.config.clone());

    match cli.command.unwrap_or(Commands::Serve {
        listen_address: None,
    }) {
        Commands::Serve { listen_address } => serve(source, listen_address).await?,
        Commands::Scrape { target, module } => scrape(source, target, module).await?,
        Commands::Modules { json } => list_modules(&source.load()?, json)?,
    }
    Ok(())
}

async fn serve(source: SettingsSource, listen_address: Option<String>) -> Result<()> {
    let store = Arc::new(SettingsStore::load(source)?);
    let settings = store.snapshot();
    locate_binary(&settings.inspec_path)?;

    let address = normalize_listen_address(
        listen_address
            .as_deref()
            .unwrap_or(settings.listen_address.as_str()),
    );
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to listen on {address}"))?;
    info!(version = env!("CARGO_PKG_VERSION"), %address, "starting inspec exporter");

    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(&store))?;

    let state = Arc::new(AppState {
        settings: store,
        stats: Arc::new(ExporterStats::new()),
    });
    tokio::select! {
        result = server::serve(listener, state) => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}

#[cfg(unix)]
fn spawn_reload_on_hangup(store: Arc<SettingsStore>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(err) = store.reload() {
                warn!(error = %format!("{err:#}"), "configuration reload failed, keeping previous settings");
            }
        }
    });
    Ok(())
}

async fn scrape(source: SettingsSource, target: String, module: String) -> Result<()> {
    let settings = source.load()?;
    let auditor = Arc::new(InspecAuditor::new(settings.inspec_path.clone()));
    let stats = ExporterStats::new();
    let request = ScrapeRequest { target, module };

    let outcome = run_scrape(&request, &settings, auditor, &stats).await?;
    print!("{}", outcome.registry.render());
    if outcome.all_failed() {
        bail!("every collector failed");
    }
    if outcome.registry.rejected() > 0 {
        warn!(
            rejected = outcome.registry.rejected(),
            "metrics with duplicate names were dropped"
        );
    }
    Ok(())
}

fn list_modules(settings: &ExporterSettings, json: bool) -> Result<()> {
    let modules = inspec_exporter_core::resolve_all(settings)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    println!(
        "{} module(s) resolved from {}",
        modules.len(),
        settings.profile_path.display()
    );
    for module in modules {
        println!(
            "- {name:<20} prefix {prefix:<20} :: {path}{remote}",
            name = module.name,
            prefix = module.prefix,
            path = module.path.display(),
            remote = describe_remote(&module)
        );
    }
    Ok(())
}

fn describe_remote(module: &ModuleConfig) -> String {
    if module.ssh_user.is_empty() && module.ssh_port == 0 {
        return String::new();
    }
    let sudo = if module.need_sudo { ", sudo" } else { "" };
    format!(" [ssh {}@:{}{}]", module.ssh_user, module.ssh_port, sudo)
}

fn init_tracing(level: Option<&str>) {
    let env_filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,tokio=warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
