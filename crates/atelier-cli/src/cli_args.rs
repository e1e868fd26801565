use clap::Parser;
use std::path::PathBuf;

/// Atelier - an AI coding assistant that turns streamed artifact markup
/// into sandboxed project edits.
#[derive(Parser, Debug)]
#[command(name = "atelier", version, about)]
pub struct Cli {
    /// The request to send to the assistant
    pub prompt: Option<String>,

    /// Project directory to operate on (defaults to the configured root)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the default provider (format: "<provider_type>.<config_name>")
    #[arg(long)]
    pub provider: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
