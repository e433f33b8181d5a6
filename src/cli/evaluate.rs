//! CLI `evaluate` command: replay events through a scratch engine and print the reports.
//!
//! The run uses a throwaway data directory, so the configured index is never touched.
//! Events are processed in file order with policy time taken from each event's own
//! timestamp, which lets a recorded sequence replay its cooldowns faithfully.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use vigil::config::VigilConfig;
use vigil::engine::ReliabilityEngine;
use vigil::event::ReliabilityEvent;

#[derive(Deserialize)]
#[serde(untagged)]
enum EventInput {
    One(ReliabilityEvent),
    Many(Vec<ReliabilityEvent>),
}

pub async fn evaluate(config: &VigilConfig, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let events = match serde_json::from_str::<EventInput>(&contents)
        .with_context(|| format!("{} is not an event or an array of events", path.display()))?
    {
        EventInput::One(event) => vec![event],
        EventInput::Many(events) => events,
    };

    let scratch = std::env::temp_dir().join(format!("vigil-evaluate-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&scratch)
        .with_context(|| format!("failed to create {}", scratch.display()))?;
    let mut scratch_config = config.clone();
    scratch_config.storage.data_dir = scratch.display().to_string();

    let result = run(&scratch_config, events).await;

    if let Err(e) = std::fs::remove_dir_all(&scratch) {
        tracing::warn!(dir = %scratch.display(), error = %e, "failed to remove scratch directory");
    }
    result
}

async fn run(config: &VigilConfig, events: Vec<ReliabilityEvent>) -> Result<()> {
    let engine = ReliabilityEngine::open(config).context("failed to open scratch engine")?;

    let mut reports = Vec::with_capacity(events.len());
    for (i, event) in events.into_iter().enumerate() {
        let at = event.timestamp;
        let report = engine
            .process_event_at(event, at)
            .await
            .with_context(|| format!("event {i} rejected"))?;
        reports.push(report);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    println!();
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);

    engine.shutdown().await?;
    Ok(())
}
