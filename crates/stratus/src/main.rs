mod commands;
mod context;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Provision cloud resources that survive throttling and eventual consistency", long_about = None)]
struct Cli {
    /// Show debug logs (every attempt and poll)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sakura Cloud servers
    #[command(subcommand)]
    Server(ServerCommands),
    /// Cloudflare DNS records
    #[command(subcommand)]
    Dns(DnsCommands),
    /// Show how an error would be classified
    Classify {
        /// Provider error code
        #[arg(long)]
        code: Option<String>,
        /// HTTP status
        #[arg(long)]
        status: Option<u16>,
        /// Error message
        #[arg(long, default_value = "")]
        message: String,
        /// Provider vocabulary to use (sakura-cloud, cloudflare)
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show version
    Version,
}

#[derive(Subcommand)]
pub enum ServerCommands {
    /// Create a server and wait until it is running
    Create {
        /// Server name
        name: String,
        /// Plan (e.g. "2core-4gb")
        #[arg(short, long)]
        plan: Option<String>,
        /// Disk size in GB
        #[arg(long)]
        disk_size: Option<i32>,
        /// OS type (e.g. "ubuntu2404")
        #[arg(long)]
        os_type: Option<String>,
        /// SSH key ID (repeatable)
        #[arg(long = "ssh-key-id")]
        ssh_key_ids: Vec<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Leave the server powered off
        #[arg(long)]
        stopped: bool,
        /// Zone
        #[arg(short, long, env = "SAKURACLOUD_ZONE", default_value = "tk1a")]
        zone: String,
    },
    /// Shut down and delete a server
    Delete {
        /// Server ID
        id: String,
        /// Zone
        #[arg(short, long, env = "SAKURACLOUD_ZONE", default_value = "tk1a")]
        zone: String,
    },
    /// Power on a server and wait until it is up
    PowerOn {
        /// Server ID
        id: String,
        /// Zone
        #[arg(short, long, env = "SAKURACLOUD_ZONE", default_value = "tk1a")]
        zone: String,
    },
    /// Shut down a server and wait until it is down
    PowerOff {
        /// Server ID
        id: String,
        /// Zone
        #[arg(short, long, env = "SAKURACLOUD_ZONE", default_value = "tk1a")]
        zone: String,
    },
    /// Show a server
    Show {
        /// Server ID
        id: String,
        /// Zone
        #[arg(short, long, env = "SAKURACLOUD_ZONE", default_value = "tk1a")]
        zone: String,
    },
}

#[derive(Subcommand)]
pub enum DnsCommands {
    /// Create or update a record and wait until the API serves it
    Ensure {
        /// Subdomain or fully qualified name
        name: String,
        /// Record content (e.g. an IP address)
        content: String,
        /// Record type
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: String,
        /// TTL in seconds (1 = automatic)
        #[arg(long, default_value_t = 1)]
        ttl: u32,
        /// Proxy through Cloudflare
        #[arg(long)]
        proxied: bool,
    },
    /// Remove a record if it exists
    Remove {
        /// Subdomain or fully qualified name
        name: String,
        /// Record type
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: String,
    },
    /// Show a record
    Show {
        /// Subdomain or fully qualified name
        name: String,
        /// Record type
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logs go to stderr; stdout is for results
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Version doesn't need settings
    if matches!(cli.command, Commands::Version) {
        println!("stratus {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = stratus_config::load()?;

    match cli.command {
        Commands::Server(command) => commands::server::handle(&settings, command).await?,
        Commands::Dns(command) => commands::dns::handle(&settings, command).await?,
        Commands::Classify {
            code,
            status,
            message,
            provider,
        } => commands::classify::handle(&settings, code, status, message, provider.as_deref())?,
        Commands::Version => {
            unreachable!("Version is handled before settings are loaded");
        }
    }

    Ok(())
}
