//! Line parser for the interactive session REPL. Slash commands map onto the
//! session and panel operations; anything else becomes free-prompt text for
//! the current mode.

/// A parsed line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// `/open <path>`: load a new primary image.
    Open(String),
    /// `/ref <path>`: attach or replace the merge reference.
    OpenReference(String),
    /// `/mode <kind>`: switch the active operation.
    Mode(String),
    /// `/set key=value ...`: update options for the active operation.
    Set(Vec<(String, String)>),
    /// Bare text or `/prompt ...`: replace the active mode's free prompt.
    Prompt(String),
    /// `/polish [text]`: rewrite the free prompt through the text model.
    Polish(Option<String>),
    /// `/go`: submit the active operation.
    Go,
    /// `/wait`: block until the in-flight operation completes.
    Wait,
    /// `/retry`: re-run the failed submission unchanged.
    Retry,
    /// `/undo`: pop the history.
    Undo,
    /// `/keep`: continue editing the new result.
    Keep,
    /// `/revert`: discard the result, keep the original.
    Revert,
    /// `/reset`: drop everything.
    Reset,
    /// `/save [path]`: write the current result (or image) to disk.
    Save(Option<String>),
    Status,
    Help,
    Quit,
    /// A slash command that is not recognized.
    Unknown(String),
    /// A recognized command with unusable arguments.
    Malformed {
        command: String,
        usage: &'static str,
    },
    Empty,
}

pub fn parse_line(input: &str) -> SessionCommand {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return SessionCommand::Empty;
    }
    if !trimmed.starts_with('/') {
        return SessionCommand::Prompt(trimmed.to_string());
    }

    let mut pieces = trimmed.splitn(2, char::is_whitespace);
    let command = pieces
        .next()
        .unwrap_or("")
        .trim_start_matches('/')
        .to_ascii_lowercase();
    let arg = pieces.next().unwrap_or("").trim();

    match command.as_str() {
        "open" => match single_path_arg(arg) {
            Some(path) => SessionCommand::Open(path),
            None => malformed("open", "/open <path>"),
        },
        "ref" | "reference" => match single_path_arg(arg) {
            Some(path) => SessionCommand::OpenReference(path),
            None => malformed("ref", "/ref <path>"),
        },
        "mode" => {
            if arg.is_empty() {
                malformed("mode", "/mode <enhance|expand|remove-background|mockup|merge>")
            } else {
                SessionCommand::Mode(arg.to_ascii_lowercase())
            }
        }
        "set" => match parse_assignments(arg) {
            Some(pairs) if !pairs.is_empty() => SessionCommand::Set(pairs),
            _ => malformed("set", "/set key=value [key=value ...]"),
        },
        "prompt" => SessionCommand::Prompt(arg.to_string()),
        "polish" => {
            if arg.is_empty() {
                SessionCommand::Polish(None)
            } else {
                SessionCommand::Polish(Some(arg.to_string()))
            }
        }
        "go" | "generate" => SessionCommand::Go,
        "wait" => SessionCommand::Wait,
        "retry" => SessionCommand::Retry,
        "undo" => SessionCommand::Undo,
        "keep" => SessionCommand::Keep,
        "revert" => SessionCommand::Revert,
        "reset" => SessionCommand::Reset,
        "save" => SessionCommand::Save(single_path_arg(arg)),
        "status" => SessionCommand::Status,
        "help" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        _ => SessionCommand::Unknown(command),
    }
}

fn malformed(command: &str, usage: &'static str) -> SessionCommand {
    SessionCommand::Malformed {
        command: command.to_string(),
        usage,
    }
}

/// First shell token of the argument, so quoted paths with spaces work. Falls
/// back to the raw argument when the quoting is unbalanced.
fn single_path_arg(arg: &str) -> Option<String> {
    if arg.is_empty() {
        return None;
    }
    let parts = match shell_words::split(arg) {
        Ok(parts) => parts,
        Err(_) => vec![arg.to_string()],
    };
    match parts.len() {
        0 => None,
        1 => Some(parts[0].clone()),
        _ => Some(parts.join(" ")),
    }
}

fn parse_assignments(arg: &str) -> Option<Vec<(String, String)>> {
    if arg.trim().is_empty() {
        return None;
    }
    let tokens = match shell_words::split(arg) {
        Ok(parts) => parts,
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    };
    let mut pairs = Vec::new();
    for token in tokens {
        let (key, value) = token.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return None;
        }
        pairs.push((key, value.trim().to_string()));
    }
    Some(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_text_becomes_prompt() {
        assert_eq!(
            parse_line("a red bicycle at dawn"),
            SessionCommand::Prompt("a red bicycle at dawn".to_string())
        );
        assert_eq!(parse_line("   "), SessionCommand::Empty);
    }

    #[test]
    fn prompt_command_allows_clearing() {
        assert_eq!(parse_line("/prompt"), SessionCommand::Prompt(String::new()));
        assert_eq!(
            parse_line("/prompt neon alley"),
            SessionCommand::Prompt("neon alley".to_string())
        );
    }

    #[test]
    fn open_takes_quoted_paths() {
        assert_eq!(
            parse_line("/open photo.png"),
            SessionCommand::Open("photo.png".to_string())
        );
        assert_eq!(
            parse_line("/open \"my product shot.png\""),
            SessionCommand::Open("my product shot.png".to_string())
        );
        assert_eq!(
            parse_line("/open"),
            SessionCommand::Malformed {
                command: "open".to_string(),
                usage: "/open <path>",
            }
        );
    }

    #[test]
    fn reference_alias_parses() {
        assert_eq!(
            parse_line("/reference bg.jpg"),
            SessionCommand::OpenReference("bg.jpg".to_string())
        );
        assert_eq!(
            parse_line("/ref bg.jpg"),
            SessionCommand::OpenReference("bg.jpg".to_string())
        );
    }

    #[test]
    fn set_parses_assignment_pairs() {
        assert_eq!(
            parse_line("/set style=upscale quality=4k"),
            SessionCommand::Set(vec![
                ("style".to_string(), "upscale".to_string()),
                ("quality".to_string(), "4k".to_string()),
            ])
        );
        assert_eq!(
            parse_line("/set theme=\"modern_studio\""),
            SessionCommand::Set(vec![(
                "theme".to_string(),
                "modern_studio".to_string()
            )])
        );
        assert!(matches!(
            parse_line("/set style"),
            SessionCommand::Malformed { .. }
        ));
        assert!(matches!(
            parse_line("/set"),
            SessionCommand::Malformed { .. }
        ));
    }

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(parse_line("/GO"), SessionCommand::Go);
        assert_eq!(parse_line("/Generate"), SessionCommand::Go);
        assert_eq!(parse_line("/QUIT"), SessionCommand::Quit);
        assert_eq!(parse_line("/exit"), SessionCommand::Quit);
    }

    #[test]
    fn save_path_is_optional() {
        assert_eq!(parse_line("/save"), SessionCommand::Save(None));
        assert_eq!(
            parse_line("/save out/final.png"),
            SessionCommand::Save(Some("out/final.png".to_string()))
        );
    }

    #[test]
    fn polish_takes_optional_text() {
        assert_eq!(parse_line("/polish"), SessionCommand::Polish(None));
        assert_eq!(
            parse_line("/polish make it moody"),
            SessionCommand::Polish(Some("make it moody".to_string()))
        );
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            parse_line("/frobnicate now"),
            SessionCommand::Unknown("frobnicate".to_string())
        );
    }
}
