use clap::{Args, Parser, Subcommand};
use condense_compress::compressor::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "condense")]
#[command(version)]
#[command(about = "Token-budgeted compression of agent context documents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty context document for an owner
    Init {
        #[arg(short, long)]
        owner: String,
    },

    /// Append content to one section of an owner's document
    Append {
        #[arg(short, long)]
        owner: String,

        /// BACKGROUND, PLAN, SUB_APP or HISTORY
        #[arg(short, long)]
        section: String,

        #[arg(short, long, default_value = "user")]
        role: String,

        /// Text, JSON, `@path` to read a file or `-` for stdin
        #[arg(short, long)]
        content: String,
    },

    /// Compress a stored document or a markup file
    Compress(CompressArgs),

    /// Print a stored document, or list owners when none is given
    Show {
        #[arg(short, long)]
        owner: Option<String>,

        /// Print the parsed document as JSON
        #[arg(long)]
        json: bool,
    },

    /// View recorded compression runs
    History {
        #[arg(short, long)]
        owner: String,

        /// Show statistics summary
        #[arg(long)]
        stats: bool,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Compress the stored document of this owner (backed up first)
    #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
    pub owner: Option<String>,

    /// Compress a markup file instead of a stored document
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Where to write the compressed file; defaults to the JSON output
    #[arg(long, requires = "file")]
    pub output: Option<PathBuf>,

    /// Compression config as JSON, or `@path` to a JSON file
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub max_token: Option<usize>,

    /// Comma-separated priority sections, or `all`
    #[arg(long, value_delimiter = ',')]
    pub target_modules: Option<Vec<String>>,

    #[arg(long)]
    pub use_tf_idf: bool,

    #[arg(long)]
    pub tf_idf_compression_ratio: Option<f64>,

    #[arg(long)]
    pub use_history_compression: bool,

    #[arg(long)]
    pub history_preserve_tokens: Option<usize>,

    #[arg(long)]
    pub history_compression_ratio: Option<f64>,

    #[command(flatten)]
    pub collaborator: CollaboratorArgs,
}

/// Generative collaborator connection; disabled without an API key
#[derive(Args, Debug)]
pub struct CollaboratorArgs {
    #[arg(long, env = "CONDENSE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "CONDENSE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}
