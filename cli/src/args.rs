use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;
use venered_cli::config::DEFAULT_CONFIG_PATH;

macro_rules! version_string {
    () => {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nCommit: ",
            env!("GIT_COMMIT_HASH"),
            " (",
            env!("GIT_BRANCH"),
            ")\nBuilt: ",
            env!("BUILD_DATE")
        )
    };
}

/// Venered - terminal client for the Venered social network
#[derive(Parser, Debug)]
#[command(name = "venered")]
#[command(version = version_string!())]
#[command(about = "Live unread badges, notifications and social commands for Venered", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long = "config", global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Project URL (overrides config and VENERED_URL)
    #[arg(short = 'u', long = "url", global = true)]
    pub url: Option<String>,

    /// Public project key (overrides config and VENERED_API_KEY)
    #[arg(long = "api-key", global = true)]
    pub api_key: Option<String>,

    /// Sign-in email
    #[arg(long = "email", global = true)]
    pub email: Option<String>,

    /// Sign-in password
    #[arg(long = "password", global = true)]
    pub password: Option<String>,

    /// Log filter, e.g. `debug` or `venered_link=trace`
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the unread message and notification counts
    Unread,

    /// Follow the badge counters and the notification feed until Ctrl-C
    Watch,

    /// Print the newest notifications
    Notifications {
        /// Number of rows to print
        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
    },

    /// Mark notifications or messages read
    MarkRead {
        /// Notification to mark read
        #[arg(long = "id", conflicts_with_all = ["all", "messages"])]
        id: Option<Uuid>,

        /// Mark every notification read
        #[arg(long = "all")]
        all: bool,

        /// Mark every incoming message read
        #[arg(long = "messages")]
        messages: bool,
    },

    /// Follow a user
    Follow { user_id: Uuid },

    /// Stop following a user
    Unfollow { user_id: Uuid },

    /// List mutual follows
    Friends,

    /// Send a direct message
    Send {
        user_id: Uuid,

        text: String,

        /// Attach an image file
        #[arg(long = "image")]
        image: Option<PathBuf>,
    },

    /// Publish a post
    Post {
        #[arg(default_value = "")]
        text: String,

        /// Attach an image file (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Find users by username or full name
    Search { term: String },
}
