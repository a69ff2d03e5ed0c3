use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: config.json when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Where Save writes the recorded landmarks
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Region selected at startup (Whole Body, Face, Hands, Legs)
    #[arg(short, long)]
    pub region: Option<String>,
}
