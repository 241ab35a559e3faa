use clap::{Parser, Subcommand};

/// GateKit CLI - run the gateway and talk to its API
#[derive(Parser, Debug)]
#[command(name = "gatekitctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// API base URL for client commands
    #[arg(long, global = true, env = "GATEKIT_API_URL", default_value = "http://127.0.0.1:8080")]
    pub api_url: String,

    /// API key for client commands (gk_{env}_...)
    #[arg(long, global = true, env = "GATEKIT_API_KEY")]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway server (configuration from environment)
    Serve,

    /// Show the calling principal and its scopes
    Whoami,

    /// Send a message to one or more targets
    Send {
        /// Project slug
        #[arg(short, long)]
        project: String,

        /// Target in `platformId:type:id` form (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Plain message text
        #[arg(long)]
        text: String,
    },

    /// Job status for a previous send
    Status {
        /// Project slug
        #[arg(short, long)]
        project: String,

        /// Job id returned by send
        job_id: String,
    },

    /// Manage API keys
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Manage projects
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Create a key (prints the plaintext exactly once)
    Create {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        name: String,

        /// Scope token (repeatable), e.g. messages:send
        #[arg(short, long = "scope")]
        scopes: Vec<String>,

        /// Expiry in days
        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// List active keys (masked)
    List {
        #[arg(short, long)]
        project: String,
    },

    /// Revoke a key immediately
    Revoke {
        #[arg(short, long)]
        project: String,

        key_id: String,
    },

    /// Roll a key (24h dual-live window for the old one)
    Roll {
        #[arg(short, long)]
        project: String,

        key_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// List visible projects
    List,

    /// Show one project
    Get { project: String },

    /// Create a project (requires a user token)
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(long)]
        slug: Option<String>,
    },
}
