//! Sonar - terminal client for streaming generations and tracking payment orders

mod api;
mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sonar_core::PayMethod;

#[derive(Parser)]
#[command(name = "sonar")]
#[command(about = "Stream marketplace generations and track payment orders")]
#[command(version)]
struct Cli {
    /// Server base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    /// API key (overrides SONAR_API_KEY and the config file)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a generation to stdout
    Chat {
        /// Prompt to send
        prompt: String,
    },

    /// Top up the balance and watch the order until it settles
    Recharge {
        /// Amount in cents
        #[arg(long)]
        amount: u64,

        /// Payment method
        #[arg(long, value_enum, default_value_t = MethodArg::Wechat)]
        method: MethodArg,
    },

    /// Look up the current status of an order once
    Status {
        /// Order id
        order_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Wechat,
    Alipay,
}

impl From<MethodArg> for PayMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Wechat => Self::Wechat,
            MethodArg::Alipay => Self::Alipay,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the streamed content
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sonar=info,sonar_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::CliConfig::load(cli.server, cli.api_key)?;
    let client = api::ApiClient::new(&config)?;

    match cli.command {
        Command::Chat { prompt } => commands::chat::run(client, prompt).await,
        Command::Recharge { amount, method } => {
            commands::recharge::run(client, &config, amount, method.into()).await
        }
        Command::Status { order_id } => commands::status::run(client, order_id).await,
    }
}
