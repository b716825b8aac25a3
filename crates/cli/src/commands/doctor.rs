//! `statewright doctor`: diagnose setup problems.

use anyhow::Result;
use std::path::Path;

use crate::runtime::{Runtime, config_path, load_config};

pub async fn run(explicit: Option<&Path>) -> Result<()> {
    println!("statewright doctor");
    println!("==================\n");

    let mut issues = 0;

    let path = config_path(explicit);
    if path.exists() {
        println!("  ok    Config file found at {}", path.display());
    } else {
        println!("  warn  No config file at {} (run `statewright config --init`)", path.display());
    }

    let config = match load_config(explicit) {
        Ok(config) => {
            println!("  ok    Config valid");
            config
        }
        Err(e) => {
            println!("  fail  {e:#}");
            println!("\n  1 issue(s) found.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ok    API key configured");
    } else {
        println!("  warn  No API key configured");
        issues += 1;
    }

    let runtime = match Runtime::from_config(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("  fail  {e:#}");
            println!("\n  {} issue(s) found.", issues + 1);
            return Ok(());
        }
    };

    match &runtime.state_model {
        Some(model) => println!("  ok    State model: {} field(s)", model.len()),
        None => println!("  info  No state model (plain replies)"),
    }
    println!("  info  Tools: {}", runtime.tools.len());

    if runtime.state_model.is_some() || runtime.config.engine.track_history {
        match runtime.store("doctor").await {
            Ok(store) => match store.get().await {
                Ok(_) => println!("  ok    State store '{}' reachable", store.name()),
                Err(e) => {
                    println!("  fail  State store: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  fail  State store: {e:#}");
                issues += 1;
            }
        }
    }

    match runtime.provider.health_check().await {
        Ok(true) => println!("  ok    Provider '{}' reachable", runtime.provider.name()),
        Ok(false) => {
            println!("  warn  Provider '{}' did not respond healthy", runtime.provider.name());
            issues += 1;
        }
        Err(e) => {
            println!("  fail  Provider '{}': {e}", runtime.provider.name());
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
