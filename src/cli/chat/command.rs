use thiserror::Error;

use super::templates::TemplateKind;

/// Which list `/history` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryTarget {
    Chat,
    Template(TemplateKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask { prompt: String },
    Template { kind: TemplateKind, input: String },
    Topic { name: Option<String> },
    Topics,
    History { target: HistoryTarget },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command: /{0}. Type /help to see the available commands.")]
    UnknownCommand(String),

    #[error("Unknown history '{0}'. Use chat, report, practices or error.")]
    UnknownHistoryTarget(String),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();

        let Some(rest) = input.strip_prefix('/') else {
            return Ok(Self::Ask {
                prompt: input.to_string(),
            });
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        Ok(match name.to_lowercase().as_str() {
            "report" => Self::Template {
                kind: TemplateKind::Report,
                input: arg.to_string(),
            },
            "practices" | "best" => Self::Template {
                kind: TemplateKind::BestPractices,
                input: arg.to_string(),
            },
            "error" => Self::Template {
                kind: TemplateKind::ErrorHelp,
                input: arg.to_string(),
            },
            "topic" => Self::Topic {
                name: (!arg.is_empty()).then(|| arg.to_string()),
            },
            "topics" => Self::Topics,
            "history" => Self::History {
                target: parse_history_target(arg)?,
            },
            "help" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        })
    }
}

fn parse_history_target(arg: &str) -> Result<HistoryTarget, ParseError> {
    Ok(match arg.to_lowercase().as_str() {
        "" | "chat" => HistoryTarget::Chat,
        "report" | "reports" => HistoryTarget::Template(TemplateKind::Report),
        "practices" | "best" => HistoryTarget::Template(TemplateKind::BestPractices),
        "error" | "errors" => HistoryTarget::Template(TemplateKind::ErrorHelp),
        _ => return Err(ParseError::UnknownHistoryTarget(arg.to_string())),
    })
}
