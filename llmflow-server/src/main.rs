//! LLMFlow server — HTTP/WebSocket front end for the research agent.

use anyhow::Context;
use clap::Parser;
use llmflow_core::api::{self, AppState};
use llmflow_core::collaborators::{
    InMemoryStore, MockLlm, MockPlanner, MockSearchTool, MockSynthesizer,
};
use llmflow_core::{Collaborators, Dispatcher, JobRegistry, Metrics, SessionRegistry, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// LLMFlow: autonomous web-research agent server
#[derive(Parser, Debug)]
#[command(name = "llmflow-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("llmflow_core={default},llmflow_server={default}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The deterministic offline collaborator set. Real intent analysis,
/// search engines, and LLM backends plug in behind the same traits.
fn offline_collaborators() -> Collaborators {
    Collaborators {
        planner: Arc::new(MockPlanner::new()),
        search: Arc::new(MockSearchTool::single(
            "https://example.com/about",
            "Example Domain",
            "This domain is for use in illustrative examples.",
        )),
        llm: Arc::new(MockLlm::with_response("SUFFICIENT")),
        synthesizer: Arc::new(MockSynthesizer::new()),
        memory: Arc::new(InMemoryStore::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config =
        load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let sessions = SessionRegistry::new();
    let jobs = JobRegistry::new();
    let metrics = Arc::new(Metrics::new());
    let dispatcher = Dispatcher::new(
        offline_collaborators(),
        sessions.clone(),
        jobs.clone(),
        metrics,
        config.engine.clone(),
    );

    // Periodic retention sweep: terminal jobs past the retention
    // window and idle terminal sessions are purged.
    let retention = config.retention.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            let purged_jobs = jobs.cleanup(chrono::Duration::hours(
                retention.job_retention_hours as i64,
            ));
            let purged_sessions = sessions.evict_idle(chrono::Duration::seconds(
                retention.session_idle_timeout_secs as i64,
            ));
            if purged_jobs + purged_sessions > 0 {
                info!(purged_jobs, purged_sessions, "retention sweep");
            }
        }
    });

    let state = Arc::new(AppState::new(dispatcher));
    info!(%host, port, "starting LLMFlow server");
    api::run(state, &host, port).await?;
    Ok(())
}
