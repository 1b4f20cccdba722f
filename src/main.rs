use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use htmlfeed::app::AppContext;
use htmlfeed::cli::{commands, Cli, Commands};
use htmlfeed::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(workers) = cli.workers {
        config.poller.workers = workers;
    }
    let ctx = AppContext::new(None, config)?;

    match cli.command {
        Commands::Follow { url } => {
            commands::follow_feed(&ctx, &url).await?;
        }
        Commands::Unfollow { url } => {
            commands::unfollow_feed(&ctx, &url).await?;
        }
        Commands::Refresh => {
            commands::refresh_feeds(&ctx).await?;
        }
        Commands::List { posts } => {
            if posts {
                commands::list_posts(&ctx)?;
            } else {
                commands::list_feeds(&ctx)?;
            }
        }
        Commands::Details { url } => {
            commands::show_details(&ctx, &url).await?;
        }
        Commands::Preview { url, start, end } => {
            commands::preview(&ctx, &url, start, end).await?;
        }
        Commands::Visit { id } => {
            commands::visit_post(&ctx, &id)?;
        }
    }

    Ok(())
}
