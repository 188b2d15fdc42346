use std::{net::SocketAddr, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::{DEFAULT_BIND, DEFAULT_REQUEST_TIMEOUT_SECS};

#[derive(Debug, Parser)]
#[command(
    name = "mangashelf",
    about = "A manga catalog with ranked title search"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Search titles
    Search(SearchArgs),
    /// Manage catalog titles
    Title {
        #[command(subcommand)]
        action: TitleAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Show catalog statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "MANGASHELF_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Seconds before an in-flight search is abandoned
    #[arg(
        long,
        env = "MANGASHELF_REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    pub request_timeout_secs: u64,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Page of results to show
    #[arg(short = 'p', long, default_value = "1")]
    pub page: i64,

    /// Results per page (clamped to 1..=50)
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: i64,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Title subcommands --

#[derive(Debug, Subcommand)]
pub enum TitleAction {
    /// Import titles from a JSON file holding an array of titles
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// List titles, most recently updated first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a title with its chapters, ratings and bookmarks
    Remove {
        /// Id of the title to remove
        id: String,
    },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "mangashelf",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["mangashelf", "search", "one piece"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "one piece");
                assert_eq!(args.page, 1);
                assert_eq!(args.limit, 20);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_search_paging() {
        let cli = Cli::parse_from([
            "mangashelf",
            "search",
            "berserk",
            "-p",
            "3",
            "-n",
            "5",
            "--json",
        ]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!((args.page, args.limit), (3, 5));
                assert!(args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_title_remove_with_global_flags() {
        let cli = Cli::parse_from([
            "mangashelf",
            "title",
            "remove",
            "abc",
            "--data-dir",
            "/tmp/shelf",
            "-q",
        ]);
        assert!(cli.quiet);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/shelf")));
        match cli.command {
            Command::Title {
                action: TitleAction::Remove { id },
            } => assert_eq!(id, "abc"),
            _ => panic!("expected title remove"),
        }
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
