// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wirecheck aggregate` command - Summarise criterion results.

use std::path::Path;

use wirecheck_benchmark::ResultAggregator;

pub async fn execute(
    criterion_dir: &Path,
    output: Option<&Path>,
    tag: String,
    counterpart: String,
    highlight: String,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(dir = %criterion_dir.display(), "Parsing criterion results");

    let aggregator = ResultAggregator::new()
        .compare(tag, counterpart)
        .highlight(highlight);
    let summary = aggregator.summarize(criterion_dir)?;

    if let Some(path) = output {
        std::fs::write(path, &summary)?;
        println!("Summary written to: {}", path.display());
        println!();
    }
    println!("{}", summary);

    Ok(())
}
