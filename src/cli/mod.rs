pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "htmlfeed")]
#[command(about = "Follow feeds published as plain HTML pages", long_about = None)]
pub struct Cli {
    /// Number of parallel workers for probing and refreshing feeds
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a feed
    Follow {
        /// Listing address, or an html://follow?<address> link
        url: String,
    },
    /// Stop following a feed
    Unfollow {
        /// Listing address of the feed
        url: String,
    },
    /// Check every feed for changes and record new posts
    Refresh,
    /// List feeds or posts
    List {
        /// Show posts instead of feeds
        #[arg(long)]
        posts: bool,
    },
    /// Print the author, description and icon of a feed as JSON
    Details {
        /// Listing address of the feed
        url: String,
    },
    /// Print the sanitized scenes of a post
    Preview {
        /// Address of the post document
        url: String,
        /// First section to include
        #[arg(long)]
        start: Option<usize>,
        /// Section after the last one to include
        #[arg(long)]
        end: Option<usize>,
    },
    /// Mark a post as visited
    Visit {
        /// Post id, as shown by `list --posts`
        id: String,
    },
}
