use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "imgtrust",
    version,
    about = "Verify that a container image is signed and recorded in a transparency log"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify an image digest against the log and its registry signatures
    Verify(VerifyArgs),
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Image manifest digest (hex, or `sha256:<hex>`)
    #[arg(long)]
    pub hash: String,

    /// Image reference used to find signatures (e.g. `ghcr.io/acme/app:v1`)
    #[arg(long)]
    pub image_ref: String,

    /// Signer public key file (SPKI PEM)
    #[arg(long)]
    pub pubkey: PathBuf,

    /// Transparency log public key file (SPKI PEM)
    #[arg(long)]
    pub rekor_pubkey: PathBuf,

    /// Transparency log base URL
    #[arg(long, env = "IMGTRUST_REKOR_URL", default_value = "https://rekor.sigstore.dev")]
    pub rekor_url: String,

    /// Registry bearer token
    #[arg(long, env = "IMGTRUST_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,

    /// Whole-call deadline in seconds
    #[arg(long, env = "IMGTRUST_TIMEOUT", default_value_t = 5)]
    pub timeout: u64,

    /// Max retries for transient transport failures
    #[arg(long, env = "IMGTRUST_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Reach the registry over plain HTTP
    #[arg(long)]
    pub insecure_registry: bool,

    /// Require the key recorded in the log entry to be the signer key
    #[arg(long)]
    pub require_log_key_match: bool,

    /// Require every log entry to carry a signed entry timestamp
    #[arg(long)]
    pub require_entry_timestamp: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Quiet mode - only exit code, no output
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
