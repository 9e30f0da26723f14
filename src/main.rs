use anyhow::{Context, Result};
use clap::Parser;
use pgoload::cli::Cli;
use pgoload::config::Config;
use pgoload::handler::{Handler, InvocationContext};
use pgoload::profile::{ProfileSession, ShutdownListener};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises the level to TRACE
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Start the process-wide capture if enabled; failures only log
fn start_profile(config: &Config) -> Option<Arc<ProfileSession>> {
    if !config.profile.enabled {
        tracing::debug!("CPU profile capture disabled");
        return None;
    }

    match ProfileSession::start(&config.profile) {
        Ok(session) => Some(Arc::new(session)),
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    }
}

/// Explicit shutdown on the normal exit path
fn stop_profile(session: Option<&ProfileSession>) {
    if let Some(session) = session {
        if let Err(e) = session.stop() {
            tracing::warn!("{}", e);
        }
    }
}

/// Run a single invocation and print the response
fn run_once(handler: &Handler, input: &str) -> Result<()> {
    let output = handler.handle(&InvocationContext::default(), input.as_bytes())?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    // Must happen before any other thread is spawned.
    let listener = ShutdownListener::install().context("Failed to block termination signals")?;

    let file_config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = args.apply(file_config);
    config.validate()?;

    let session = start_profile(&config);

    listener
        .spawn(session.clone(), |_| std::process::exit(0))
        .context("Failed to spawn signal listener")?;

    let handler = Handler::new(config.engine.clone(), config.input.policy)?;

    let outcome = if args.serve {
        handler
            .serve(io::stdin().lock(), io::stdout().lock())
            .map(|handled| tracing::info!(handled, "stdin closed"))
            .context("Failed while serving requests")
    } else if args.burst {
        tracing::info!("running self-test burst");
        run_once(&handler, "")
    } else {
        run_once(&handler, args.input.as_deref().unwrap_or(""))
    };

    stop_profile(session.as_deref());
    outcome
}
