// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::Context;
use std::env;
use std::time::Instant;
use uuid::Uuid;

use dagline::config::{load_workflow, validate_workflow, Workflow};
use dagline::engine::DagRunner;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <workflow.yaml|workflow.json> [parameters-json]", args[0]);
        eprintln!("Example: {} workflows/etl.yaml '{{\"seed\": 42}}'", args[0]);
        std::process::exit(1);
    }

    match run(&args).await {
        Ok(()) => {}
        Err(error) => {
            eprintln!("{:#}", error);
            std::process::exit(1);
        }
    }
}

async fn run(args: &[String]) -> anyhow::Result<()> {
    let workflow: Workflow =
        load_workflow(&args[1]).with_context(|| format!("loading workflow {}", args[1]))?;

    if let Err(errors) = validate_workflow(&workflow) {
        let listing: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        anyhow::bail!(
            "workflow '{}' is invalid:\n{}",
            workflow.name,
            listing.join("\n")
        );
    }

    let parameters = match args.get(2) {
        Some(raw) => serde_json::from_str(raw).context("parameters are not valid JSON")?,
        None => serde_json::json!({}),
    };

    let execution_id = Uuid::new_v4().simple().to_string();
    println!(
        "Executing workflow '{}' ({} nodes, execution {})",
        workflow.name,
        workflow.nodes.len(),
        execution_id
    );

    let runner = DagRunner::new();
    let started = Instant::now();
    match runner.execute(&workflow, &execution_id, &parameters).await {
        Ok(results) => {
            println!("Completed in {:?}", started.elapsed());
            for (node_id, output) in results {
                println!("  {} -> {}", node_id, output);
            }
            Ok(())
        }
        Err(error) => {
            if let Some(snapshot) = runner.execution(&execution_id) {
                for (node_id, node) in snapshot.nodes {
                    println!("  {} [{}]", node_id, node.status.as_str());
                }
            }
            Err(anyhow::Error::new(error))
                .with_context(|| format!("execution failed after {:?}", started.elapsed()))
        }
    }
}
