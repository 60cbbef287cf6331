//! screenflow - pipeline checker
//!
//! Loads pipeline files or directories the same way the engine does and
//! reports problems before they surface at run time.
//!
//! ```text
//! screenflow [--config FILE] [--entry NAME]... PIPELINE...
//! ```
//!
//! Exits non-zero if loading fails, a fatal issue is found, or an entry is
//! missing from the graph.

use anyhow::Context;
use clap::Parser;
use screenflow::{
    config::EngineConfig,
    graph::{PipelineResource, Resource},
    FlowError,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "screenflow",
    version,
    about = "Check pipeline files before running them"
)]
struct Cli {
    /// Engine config file (defaults to the platform data directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node that must exist in the loaded graph; may be repeated
    #[arg(long = "entry", value_name = "NAME")]
    entries: Vec<String>,

    /// Pipeline JSON files or directories, loaded in order
    #[arg(required = true)]
    pipelines: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(),
    };
    let _log_guard = screenflow::logging::init(&config.logging)?;

    tracing::info!("Checking {} pipeline path(s)", args.pipelines.len());

    let resource = PipelineResource::new(config.defaults.clone());
    resource
        .load_paths(&args.pipelines)
        .context("Failed to load pipelines")?;
    let graph = resource.graph();

    let issues = graph.validate();
    for issue in &issues {
        if issue.is_fatal() {
            tracing::error!("{}", issue);
        } else {
            tracing::warn!("{}", issue);
        }
    }

    let fatal = issues.iter().filter(|i| i.is_fatal()).count();
    let mut missing = 0;
    for entry in &args.entries {
        if resource.get_node(entry).is_none() {
            tracing::error!("{}", FlowError::GraphLookup(entry.clone()));
            missing += 1;
        }
    }

    println!(
        "{} nodes, {} issue(s), {} fatal, {} missing entr{}",
        graph.len(),
        issues.len(),
        fatal,
        missing,
        if missing == 1 { "y" } else { "ies" }
    );

    if fatal + missing > 0 {
        std::process::exit(1);
    }
    Ok(())
}
