// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wirecheck verify` command - Run suite scenarios.
//!
//! Prints a pass/fail table and exits non-zero when any scenario fails.

use std::path::Path;

use wirecheck_core::{ConfigLoader, ScenarioOutcome, ScenarioRunner, ScenarioSpec};

pub async fn execute(file: &Path, names: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let suite = ConfigLoader::load_file(file)?;
    let scenarios = suite.select(names)?;

    tracing::info!(
        file = %file.display(),
        scenarios = scenarios.len(),
        "Running suite"
    );

    let runner = ScenarioRunner::new(suite.harness.clone());
    let outcomes = runner.run_all(&scenarios).await;

    print_table(&scenarios, &outcomes);

    let failed: Vec<&ScenarioOutcome> = outcomes.iter().filter(|o| !o.passed()).collect();
    if !failed.is_empty() {
        println!();
        println!("Failures:");
        for outcome in &failed {
            if let Err(e) = &outcome.result {
                println!("  ✗ {}: {}", outcome.name, e);
            }
        }
        println!();
        println!("{} of {} scenario(s) failed", failed.len(), outcomes.len());
        std::process::exit(1);
    }

    println!();
    println!("All {} scenario(s) passed", outcomes.len());
    Ok(())
}

fn print_table(scenarios: &[ScenarioSpec], outcomes: &[ScenarioOutcome]) {
    println!("╔═══════════════════════════╦═════════╦════════╦══════════╦══════════╦════════════╗");
    println!("║ Scenario                  ║ Pattern ║ Result ║ Checked  ║ Attempts ║ Time       ║");
    println!("╠═══════════════════════════╬═════════╬════════╬══════════╬══════════╬════════════╣");

    for (scenario, outcome) in scenarios.iter().zip(outcomes) {
        let (result, checked) = match &outcome.result {
            Ok(checked) => ("PASS", checked.to_string()),
            Err(_) => ("FAIL", "-".to_string()),
        };
        println!(
            "║ {:<25} ║ {:<7} ║ {:<6} ║ {:<8} ║ {:<8} ║ {:<10} ║",
            truncate(scenario.name.as_str(), 25),
            scenario.pattern_name(),
            result,
            checked,
            outcome.attempts,
            format!("{}ms", outcome.elapsed.as_millis())
        );
    }

    println!("╚═══════════════════════════╩═════════╩════════╩══════════╩══════════╩════════════╝");
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut cut: String = value.chars().take(width - 1).collect();
        cut.push('…');
        cut
    }
}
