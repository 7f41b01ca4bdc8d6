//! CLI argument definitions for maestro.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// maestro -- route a request to the expert persona best suited to answer it.
#[derive(Parser)]
#[command(
    name = "maestro",
    version,
    about = "maestro -- keyword and context based expert-persona selector",
    long_about = "Matches free-text requests against a Markdown table of expert personas, \
                  keeps per-session continuity, and explains how a request would be split \
                  between several experts."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (defaults to `config/default.toml` when present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Persona rule table to load instead of the built-in one.
    #[arg(long, global = true, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Keep sessions in memory only; nothing is read from or written to disk.
    #[arg(long, global = true)]
    pub no_store: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Select the persona(s) for a single request.
    Select {
        /// The request text. Several words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,

        /// Explain matched terms, the selection reason, and the task plan.
        #[arg(long, short)]
        verbose: bool,

        /// Reuse (or start) a named conversation context.
        #[arg(long, short)]
        session: Option<String>,

        /// Print the selection as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive loop over one conversation context.
    Repl {
        /// Resume or create a named session.
        #[arg(long, short)]
        session: Option<String>,
    },

    /// Route JSON-lines requests (`{"session": .., "request": ..}`),
    /// one worker per session.
    Batch {
        /// Input file, or `-` for stdin.
        #[arg(default_value = "-")]
        input: String,
    },

    /// List the personas in the rule table.
    Personas {
        /// Only show one category (e.g. `frontend`, `ai_ml`).
        #[arg(long, short)]
        category: Option<String>,
    },

    /// Validate the configuration and rule table.
    Check,

    /// Manage stored sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show how often each persona was selected.
    Stats {
        /// Restrict the counts to one session.
        #[arg(long, short)]
        session: Option<String>,
    },
}

/// Actions for managing stored sessions.
#[derive(Subcommand)]
pub enum SessionAction {
    /// List stored sessions, most recently used first.
    List {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show the selection history of a session.
    Show {
        /// The session id to display.
        id: String,
    },
    /// Delete a session and its history.
    Delete {
        /// The session id to delete.
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_joins_words_and_reads_flags() {
        let cli = Cli::try_parse_from([
            "maestro", "select", "--verbose", "--session", "s1", "Create", "a", "React",
            "component",
        ])
        .unwrap();
        match cli.command {
            Commands::Select {
                request,
                verbose,
                session,
                json,
            } => {
                assert_eq!(request.join(" "), "Create a React component");
                assert!(verbose);
                assert!(!json);
                assert_eq!(session.as_deref(), Some("s1"));
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn select_requires_a_request() {
        assert!(Cli::try_parse_from(["maestro", "select"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli =
            Cli::try_parse_from(["maestro", "personas", "--rules", "r.md", "--no-store"]).unwrap();
        assert_eq!(cli.global.rules, Some(PathBuf::from("r.md")));
        assert!(cli.global.no_store);
    }

    #[test]
    fn batch_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["maestro", "batch"]).unwrap();
        assert!(matches!(cli.command, Commands::Batch { input } if input == "-"));
    }
}
