mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crm_mcp::config::CrmConfig;
use crm_mcp::server;

#[derive(Parser)]
#[command(name = "crm-mcp", version, about = "Field-service CRM tool server for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio unless --http or server.transport = "http")
    Serve {
        /// Serve MCP and voice commands over HTTP
        #[arg(long)]
        http: bool,
    },
    /// Inspect or call catalog tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Run one voice command and print the reply
    Voice {
        /// What the user said
        text: String,
        #[arg(long)]
        account: Option<String>,
    },
    /// Create an account and its owner
    Init {
        #[arg(long)]
        account_name: String,
        #[arg(long)]
        owner_email: String,
        #[arg(long, default_value = "Owner")]
        owner_name: String,
        /// Use this ID instead of generating one
        #[arg(long)]
        account_id: Option<String>,
    },
    /// Show database and account statistics
    Stats {
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List tool names and descriptions
    List {
        /// Print full definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call a tool and print its result
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CrmConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Tools { action } => match action {
            ToolsAction::List { json } => cli::tools::list(json)?,
            ToolsAction::Call {
                name,
                args,
                account,
                user,
            } => cli::tools::call(&config, &name, &args, account, user).await?,
        },
        Command::Voice { text, account } => cli::voice::run(&config, &text, account).await?,
        Command::Init {
            account_name,
            owner_email,
            owner_name,
            account_id,
        } => cli::init::init(&config, &account_name, &owner_email, &owner_name, account_id)?,
        Command::Stats { account } => cli::stats::stats(&config, account.as_deref())?,
    }

    Ok(())
}
