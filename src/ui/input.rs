//! Line input handling.
//!
//! Parses one input line into a [`Command`] and dispatches it to the
//! controller. While a confirmation is pending, the line is read as the
//! answer instead.

use anyhow::Result;
use std::io::Write;
use thiserror::Error;

use blogfeed::feed::FeedController;

use super::output;
use super::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    More,
    /// Set the search input without running a search. Empty text clears it.
    Type(String),
    Clear,
    /// Search for the given term, or the current input when none is given
    Search(Option<String>),
    Delete(String),
    Tags,
    Categories,
    Active(String),
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}' (type 'help' for a list)")]
    Unknown(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => Command::List,
        "more" | "m" => Command::More,
        "type" => Command::Type(rest.to_string()),
        "clear" => Command::Clear,
        "search" | "/" => Command::Search((!rest.is_empty()).then(|| rest.to_string())),
        "delete" | "rm" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "delete",
                    argument: "an item id",
                });
            }
            Command::Delete(rest.to_string())
        }
        "tags" => Command::Tags,
        "categories" | "cats" => Command::Categories,
        "active" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "active",
                    argument: "a name",
                });
            }
            Command::Active(rest.to_string())
        }
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Anything but an explicit yes declines.
pub fn parse_confirmation(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Route one input line to the controller.
pub(super) fn handle_line<W: Write>(
    controller: &mut FeedController,
    line: &str,
    out: &mut W,
) -> Result<Action> {
    if controller.pending_confirm().is_some() {
        let accepted = parse_confirmation(line);
        controller.confirm_delete(accepted);
        return Ok(Action::Continue);
    }

    match parse_command(line) {
        Ok(Some(command)) => handle_command(controller, command, out),
        Ok(None) => Ok(Action::Continue),
        Err(e) => {
            writeln!(out, "{}", e)?;
            Ok(Action::Continue)
        }
    }
}

fn handle_command<W: Write>(
    controller: &mut FeedController,
    command: Command,
    out: &mut W,
) -> Result<Action> {
    match command {
        Command::List => output::items(out, controller)?,
        Command::More => {
            if !controller.request_more() {
                writeln!(out, "{}", output::more_unavailable_reason(controller))?;
            }
        }
        Command::Type(text) => controller.update_search_input(&text),
        Command::Clear => controller.update_search_input(""),
        Command::Search(Some(term)) => controller.apply_search_query(Some(&term)),
        Command::Search(None) => {
            if controller.search_input().trim().is_empty() {
                writeln!(out, "Nothing to search for: use 'search <term>' or 'type <term>' first")?;
            } else {
                controller.submit_search();
            }
        }
        Command::Delete(id) => {
            controller.request_delete(&id);
            if controller.pending_confirm().is_some() {
                output::confirm_prompt(out, controller)?;
            }
        }
        Command::Tags => output::tags(out, controller)?,
        Command::Categories => output::categories(out, controller)?,
        Command::Active(name) => {
            if !controller.set_active(&name) {
                writeln!(out, "Already showing '{}'", name)?;
            }
        }
        Command::Reset => controller.reset(),
        Command::Help => output::help(out)?,
        Command::Quit => return Ok(Action::Quit),
    }
    Ok(Action::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("list"), Ok(Some(Command::List)));
        assert_eq!(parse_command("  MORE "), Ok(Some(Command::More)));
        assert_eq!(parse_command("q"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("cats"), Ok(Some(Command::Categories)));
    }

    #[test]
    fn test_blank_line_is_none() {
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("   \t"), Ok(None));
    }

    #[test]
    fn test_arguments_keep_inner_spaces() {
        assert_eq!(
            parse_command("search  Hello World "),
            Ok(Some(Command::Search(Some("Hello World".into()))))
        );
        assert_eq!(
            parse_command("type rust async"),
            Ok(Some(Command::Type("rust async".into())))
        );
    }

    #[test]
    fn test_search_without_term_uses_input() {
        assert_eq!(parse_command("search"), Ok(Some(Command::Search(None))));
    }

    #[test]
    fn test_type_without_text_clears() {
        assert_eq!(parse_command("type"), Ok(Some(Command::Type(String::new()))));
    }

    #[test]
    fn test_missing_arguments() {
        assert_eq!(
            parse_command("delete"),
            Err(CommandError::MissingArgument {
                command: "delete",
                argument: "an item id"
            })
        );
        assert!(matches!(
            parse_command("active"),
            Err(CommandError::MissingArgument { command: "active", .. })
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("frobnicate now"),
            Err(CommandError::Unknown("frobnicate".into()))
        );
    }

    #[test]
    fn test_confirmation_answers() {
        assert!(parse_confirmation("y"));
        assert!(parse_confirmation(" YES "));
        assert!(!parse_confirmation(""));
        assert!(!parse_confirmation("n"));
        assert!(!parse_confirmation("yep"));
    }
}
