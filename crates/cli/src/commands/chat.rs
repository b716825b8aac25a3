//! `statewright chat`: one message or an interactive session.

use anyhow::{Result, bail};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::runtime::{Runtime, load_config};

pub async fn run(config_path: Option<&Path>, message: Option<String>, session: &str) -> Result<()> {
    let config = load_config(config_path)?;

    // Check for API key early and give a clear error
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    STATEWRIGHT_API_KEY   (generic)");
        eprintln!("    OPENROUTER_API_KEY    (recommended)");
        eprintln!("    OPENAI_API_KEY        (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add api_key to {}", crate::runtime::config_path(config_path).display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }

    let runtime = Runtime::from_config(config)?;
    let agent = runtime.agent(session).await?;

    if let Some(msg) = message {
        let result = agent.process(&msg).await?;
        return super::print_json(&result);
    }

    println!();
    println!("  statewright interactive mode");
    println!();
    println!("  Provider:  {}", runtime.config.default_provider);
    println!("  Model:     {}", runtime.config.default_model);
    println!("  Session:   {session}");
    println!(
        "  State:     {}",
        runtime
            .state_model
            .as_ref()
            .map_or("none".to_string(), |m| format!("{} field(s)", m.len()))
    );
    println!("  Tools:     {}", runtime.tools.len());
    println!();
    println!("  Type your message and press Enter. Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match agent.process(line).await {
            Ok(result) => {
                println!();
                for text in result.response.as_deref().unwrap_or_default().lines() {
                    println!("  Assistant > {text}");
                }
                if !result.state_changed_props.is_empty() {
                    println!("  (updated: {})", result.state_changed_props.join(", "));
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
