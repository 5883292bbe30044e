//! Venered CLI - terminal client for the Venered social network
//!
//! # Usage
//!
//! ```bash
//! # Badge counts once
//! venered --url https://project.supabase.co --api-key <anon> unread
//!
//! # Live badges and notifications until Ctrl-C
//! venered watch
//!
//! # Message someone with a picture
//! venered send <user-id> "look at this" --image cat.png
//! ```

use clap::Parser;
use venered_cli::logging::{init_logging, resolve_level};
use venered_cli::{CLIConfiguration, OutputFormatter, Result};
use venered_link::EventHandlers;

mod args;
mod commands;
mod connect;

use args::{Cli, Command};
use connect::connect;

async fn run(cli: Cli, config: CLIConfiguration, formatter: &OutputFormatter) -> Result<()> {
    let handlers = match cli.command {
        Command::Watch => commands::watch::live_handlers(),
        _ => EventHandlers::new(),
    };
    let connected = connect(&cli, &config, handlers).await?;

    match cli.command {
        Command::Unread => commands::unread::run(&connected, formatter).await,
        Command::Watch => commands::watch::run(&connected, formatter).await,
        Command::Notifications { limit } => {
            commands::notifications::run(&connected, formatter, limit).await
        },
        Command::MarkRead { id, all, messages } => {
            let target = commands::mark_read::target(id, all, messages)?;
            commands::mark_read::run(&connected, formatter, target).await
        },
        Command::Follow { user_id } => commands::social::follow(&connected, formatter, user_id).await,
        Command::Unfollow { user_id } => {
            commands::social::unfollow(&connected, formatter, user_id).await
        },
        Command::Friends => commands::social::friends(&connected, formatter).await,
        Command::Send {
            user_id,
            ref text,
            ref image,
        } => {
            commands::social::send(&connected, formatter, user_id, text, image.as_deref()).await
        },
        Command::Post {
            ref text,
            ref images,
        } => commands::social::post(&connected, formatter, text, images).await,
        Command::Search { ref term } => commands::social::search(&connected, formatter, term).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color;
    if !color {
        colored::control::set_override(false);
    }
    let formatter = OutputFormatter::new(color);

    let config = match CLIConfiguration::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e));
            std::process::exit(2);
        },
    };

    let level = resolve_level(
        cli.log_level.as_deref(),
        std::env::var("RUST_LOG").ok(),
        &config.logging.level,
    );
    if let Err(e) = init_logging(&level, color) {
        eprintln!("{}", formatter.format_error(&e));
    }

    if let Err(e) = run(cli, config, &formatter).await {
        eprintln!("{}", formatter.format_error(&e));
        std::process::exit(1);
    }
}
