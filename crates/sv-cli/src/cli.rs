use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sv")]
#[command(about = "Secure Vision: sensitive-data aware document vault", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Report sensitive data found in a file
    Scan {
        path: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a file with sensitive data masked
    Mask {
        path: PathBuf,

        /// Comma-separated categories (email,phone,credit_card,ssn); default all
        #[arg(long)]
        categories: Option<String>,

        /// Print text and redactions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encrypt a file to <path>.encrypted
    Encrypt {
        path: PathBuf,

        /// Delete the plaintext once the ciphertext is written
        #[arg(long)]
        remove_original: bool,
    },

    /// Decrypt a .encrypted file next to itself
    Decrypt { path: PathBuf },

    /// Manage accounts
    #[command(subcommand)]
    User(UserCommands),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create an account
    Create {
        email: String,

        /// Grant the admin role
        #[arg(long)]
        admin: bool,

        #[arg(long, env = "SV_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// List all accounts
    List,

    /// Apply a subscription to an account
    Subscribe { email: String },
}
