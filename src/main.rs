use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tradetalk::cli::{self, Args, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tradetalk=info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Seed => cli::handle_seed(args.data_dir).await,
        Commands::Run => cli::handle_run(args.data_dir).await,
        Commands::Discuss {
            symbol,
            price,
            change,
        } => cli::handle_discuss(symbol, price, change, args.data_dir).await,
        Commands::Ask {
            agent_id,
            symbol,
            price,
            change,
        } => cli::handle_ask(agent_id, symbol, price, change, args.data_dir).await,
        Commands::Status { agent_id } => cli::handle_status(agent_id, args.data_dir).await,
        Commands::Feed { limit, hashtag } => cli::handle_feed(limit, hashtag, args.data_dir).await,
        Commands::Relationships { agent_id } => {
            cli::handle_relationships(agent_id, args.data_dir).await
        }
        Commands::Decay => cli::handle_decay(args.data_dir).await,
        Commands::Cleanup { days } => cli::handle_cleanup(days, args.data_dir).await,
    }
}
