use crate::models::SourceType;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "casetrace",
    about = "casetrace - Forensic communication analysis engine",
    version
)]
pub struct Args {
    /// Evidence artifact to analyze (message store, mbox, chat export)
    pub artifact: PathBuf,

    /// Declared source type of the artifact
    #[arg(short = 't', long, value_enum)]
    pub source_type: SourceType,

    /// Case identifier the source belongs to
    #[arg(short, long)]
    pub case_id: String,

    /// Human-readable source name (defaults to the artifact file name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Uploader / examiner identifier recorded on the source
    #[arg(short, long, default_value = "examiner")]
    pub uploader: String,

    /// Evidence database path
    #[arg(long, default_value = "casetrace.db")]
    pub db: PathBuf,

    /// Write the analysis report as pretty-printed JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable verbose logging of all operations
    #[arg(short, long)]
    pub verbose: bool,

    /// Hide progress bars and use quiet output
    #[arg(short, long)]
    pub quiet: bool,
}
