//! Lantern CLI - Command-line interface for Lantern
//!
//! Hosts an object tree behind the Lantern server, and talks to a running
//! server to inspect, change and watch it.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "lantern")]
#[command(author = "Lantern Contributors")]
#[command(version)]
#[command(about = "Inspect and observe a live object tree", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server to connect to
    #[arg(long, global = true, default_value = client::DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Lantern server
    Serve {
        /// JSON fixture describing the object tree (defaults to a demo window)
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Address to bind (overrides LANTERN_SERVER_HOST)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides LANTERN_SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Observer poll interval in milliseconds (overrides LANTERN_POLL_INTERVAL_MS)
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// Print the object tree
    Tree {
        /// Only print the subtree below this object
        #[arg(long)]
        root: Option<String>,
    },

    /// Find objects matching a query
    Find {
        /// A path, or a JSON query such as '{"type":"Button"}'
        query: String,
    },

    /// Show the properties of one object
    Props {
        /// A path, or a JSON query
        query: String,
    },

    /// Change a property of one object
    Set {
        /// A path, or a JSON query
        query: String,

        /// Property name
        property: String,

        /// New value, as JSON (bare words are taken as strings)
        value: String,
    },

    /// List the methods of one object
    Methods {
        /// A path, or a JSON query
        query: String,
    },

    /// Invoke a method on one object
    Call {
        /// A path, or a JSON query
        query: String,

        /// Method name
        method: String,

        /// Arguments, as JSON (bare words are taken as strings)
        args: Vec<String>,
    },

    /// Stream changes until interrupted
    Watch {
        /// Only watch the subtree below this object
        #[arg(long, conflicts_with = "props")]
        root: Option<String>,

        /// Watch the properties of this object instead of the tree
        #[arg(long)]
        props: Option<String>,
    },

    /// Switch change observation on or off
    Observer {
        #[command(subcommand)]
        action: ObserverAction,
    },
}

#[derive(Subcommand)]
enum ObserverAction {
    /// Start observing
    Start,
    /// Stop observing
    Stop,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let url = cli.url;
    let result = match cli.command {
        Commands::Serve {
            fixture,
            host,
            port,
            poll_ms,
        } => commands::serve(fixture.as_deref(), host, port, poll_ms).await,
        Commands::Tree { root } => commands::tree(&url, root.as_deref()).await,
        Commands::Find { query } => commands::find(&url, &query).await,
        Commands::Props { query } => commands::props(&url, &query).await,
        Commands::Set {
            query,
            property,
            value,
        } => commands::set(&url, &query, &property, &value).await,
        Commands::Methods { query } => commands::methods(&url, &query).await,
        Commands::Call {
            query,
            method,
            args,
        } => commands::call(&url, &query, &method, &args).await,
        Commands::Watch { root, props } => match props {
            Some(object) => commands::watch_properties(&url, &object).await,
            None => commands::watch_tree(&url, root.as_deref()).await,
        },
        Commands::Observer { action } => {
            commands::observer(&url, matches!(action, ObserverAction::Start)).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
