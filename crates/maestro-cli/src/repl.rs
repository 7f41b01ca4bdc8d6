//! Subcommand: `maestro repl` -- interactive loop over one session.
//!
//! Every line is routed against the same conversation context, so
//! continuity between requests is visible as you type.

use std::io::{self, BufRead, Write as _};

use anyhow::{Context, Result};
use maestro_kernel::{ConversationContext, KernelError, SessionState};
use tracing::{info, warn};

use crate::runtime::App;
use crate::select::{SelectReport, render_explanation, render_personas};

/// What a REPL line asks for.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Quit,
    Help,
    History,
    State,
    /// Toggle the detailed explanation.
    Verbose,
    Request(&'a str),
    Empty,
}

fn parse_line(line: &str) -> Line<'_> {
    match line.trim() {
        "" => Line::Empty,
        "quit" | "exit" | ":q" => Line::Quit,
        ":help" | "help" => Line::Help,
        ":history" => Line::History,
        ":state" => Line::State,
        ":verbose" => Line::Verbose,
        request => Line::Request(request),
    }
}

/// Run the interactive REPL.
pub async fn cmd_repl(app: &App, session_id: Option<&str>) -> Result<()> {
    let mut session = app.open_session(session_id).await?;
    let mut verbose = false;

    println!();
    println!("  maestro v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  session {} ({} previous requests{})",
        session.context().session_id(),
        session.context().history().len(),
        if session.is_persistent() { ", saved" } else { "" }
    );
    println!("  Type a request, :help for commands, or 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("maestro> ");
        io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("failed to read input")?;

        match parse_line(&line) {
            Line::Empty => continue,
            Line::Quit => {
                info!("user requested exit");
                break;
            }
            Line::Help => print_help(),
            Line::History => print!("{}", render_history(session.context())),
            Line::State => match session.context().state() {
                SessionState::NoActivePersona => println!("  no active persona"),
                SessionState::PersonaActive(persona) => println!("  active: {persona}"),
            },
            Line::Verbose => {
                verbose = !verbose;
                println!("  verbose {}", if verbose { "on" } else { "off" });
            }
            Line::Request(request) => {
                let selection = match session.select(&app.selector, request).await {
                    Ok(selection) => selection,
                    Err(err) if err.downcast_ref::<KernelError>().is_some() => {
                        println!("  error: {err}");
                        continue;
                    }
                    Err(err) => {
                        warn!(error = %err, "selection could not be saved");
                        println!("  error: {err:#}");
                        continue;
                    }
                };

                print!("{}", render_personas(&selection));
                if verbose {
                    let report = SelectReport::detailed(
                        session.context().session_id(),
                        &selection,
                        request,
                        &app.analyzer,
                        app.selector.table(),
                    );
                    print!("{}", render_explanation(&report));
                }
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!();
    println!("  Commands:");
    println!("    <request>     Route a request to the best persona");
    println!("    :history      Show this session's requests");
    println!("    :state        Show the active persona");
    println!("    :verbose      Toggle detailed explanations");
    println!("    quit / exit   Leave the REPL");
    println!();
}

fn render_history(ctx: &ConversationContext) -> String {
    if ctx.history().is_empty() {
        return "  (no requests yet)\n".to_string();
    }
    ctx.history()
        .iter()
        .enumerate()
        .map(|(n, entry)| {
            format!(
                "  {:>3}. {} -> {}\n",
                n + 1,
                entry.request,
                entry.personas.join(", ")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_classified() {
        assert_eq!(parse_line("   "), Line::Empty);
        assert_eq!(parse_line("exit"), Line::Quit);
        assert_eq!(parse_line(" :history "), Line::History);
        assert_eq!(parse_line("  React hooks  "), Line::Request("React hooks"));
    }

    #[test]
    fn empty_history_has_placeholder() {
        let ctx = ConversationContext::new("t");
        assert_eq!(render_history(&ctx), "  (no requests yet)\n");
    }
}
