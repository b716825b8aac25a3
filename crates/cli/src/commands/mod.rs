pub mod batch;
pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod handle;

/// Print a result as pretty JSON on stdout.
pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
