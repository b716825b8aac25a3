//! `statewright handle`: apply a user or system message to session state.

use anyhow::Result;
use statewright_agent::HandlerRole;
use std::path::Path;

use crate::runtime::{Runtime, load_config};

pub async fn run(
    config_path: Option<&Path>,
    role: HandlerRole,
    message: &str,
    session: &str,
) -> Result<()> {
    let runtime = Runtime::from_config(load_config(config_path)?)?;
    let handler = runtime.handler(session).await?;
    let result = handler.handle(role, message).await?;
    super::print_json(&result)
}
