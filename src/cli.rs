use clap::Parser;
use std::path::PathBuf;

/// Ask a question about your documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Question to ask
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Document the answer must be grounded in (repeatable)
    #[arg(short = 'd', long = "document")]
    pub documents: Vec<String>,

    /// Configuration file (default: searched in the config directories)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend base URL, overrides the configuration
    #[arg(long)]
    pub base_url: Option<String>,

    /// Append finished turns to this JSON lines file
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }

    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}
