// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wirecheck validate` command - Validate a suite file.

use std::path::Path;

use wirecheck_core::{ConfigLoader, ScenarioKind, ScenarioSpec, Side};

pub async fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating suite");

    match ConfigLoader::load_file(file) {
        Ok(suite) => {
            let harness = &suite.harness;
            println!("✓ Suite is valid");
            println!();
            println!("Harness Settings:");
            println!("  Grace Timeout:      {}ms", harness.grace_timeout.as_millis());
            println!("  Ready Timeout:      {}ms", harness.ready_timeout.as_millis());
            println!("  Receive Timeout:    {}ms", harness.recv_timeout.as_millis());
            println!(
                "  Observation Window: {}ms",
                harness.observation_window.as_millis()
            );
            println!("  Retry Attempts:     {}", harness.retry_attempts);
            println!("  Host:               {}", harness.host);
            println!();
            println!("Scenarios ({}):", suite.scenarios.len());
            for scenario in &suite.scenarios {
                println!("  - {}", describe(scenario));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Suite validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

fn side(side: &Side) -> String {
    match side {
        Side::Local => "local".to_string(),
        Side::Remote(spec) => spec.executable.program_name(),
    }
}

/// One-line summary of a scenario's roles and size.
fn describe(scenario: &ScenarioSpec) -> String {
    match &scenario.kind {
        ScenarioKind::RequestReply {
            requester,
            replier,
            exchanges,
            ..
        } => format!(
            "{} (req_rep, requester: {}, replier: {}, exchanges: {})",
            scenario.name,
            side(requester),
            side(replier),
            exchanges.len()
        ),
        ScenarioKind::PublishSubscribe {
            publisher,
            subscriber,
            publication,
        } => format!(
            "{} (pub_sub, publisher: {}, subscriber: {}, topic: {:?}, messages: {})",
            scenario.name,
            side(publisher),
            side(subscriber),
            publication.subscription.prefix(),
            publication.messages.len()
        ),
    }
}
