//! Line-oriented command surface of the `medic` binary.

use shared_types::UiCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ui(UiCommand),
    /// Print the current session snapshot
    State,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  rename              open the rename workflow
  dedup               open the deduplicate workflow
  intro               back to the intro screen
  back                from the rename page back to the drop zone
  cancel              cancel the current drop
  drop <path>...      simulate dropping paths (exactly one is accepted)
  state               print the session snapshot
  quit                exit
  {\"type\": ...}       raw UI command as JSON";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("invalid UI command JSON: {0}")]
    Json(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if line.starts_with('{') {
            return serde_json::from_str::<UiCommand>(line)
                .map(ReplCommand::Ui)
                .map_err(|e| ParseError::Json(e.to_string()));
        }

        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let command = match verb {
            "rename" => ReplCommand::Ui(UiCommand::NavigateRename),
            "dedup" | "deduplicate" => ReplCommand::Ui(UiCommand::NavigateDeduplicate),
            "intro" => ReplCommand::Ui(UiCommand::NavigateIntro),
            "back" => ReplCommand::Ui(UiCommand::NavigateToDrop),
            "cancel" => ReplCommand::Ui(UiCommand::Cancel),
            "drop" => ReplCommand::Ui(UiCommand::InputDropped {
                paths: words.map(str::to_string).collect(),
            }),
            "state" => ReplCommand::State,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" => ReplCommand::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_words() {
        assert_eq!(
            ReplCommand::parse("rename").unwrap(),
            ReplCommand::Ui(UiCommand::NavigateRename)
        );
        assert_eq!(
            ReplCommand::parse("  back ").unwrap(),
            ReplCommand::Ui(UiCommand::NavigateToDrop)
        );
        assert_eq!(ReplCommand::parse("quit").unwrap(), ReplCommand::Quit);
    }

    #[test]
    fn test_drop_keeps_path_order() {
        let cmd = ReplCommand::parse("drop /b /a").unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Ui(UiCommand::InputDropped {
                paths: vec!["/b".into(), "/a".into()]
            })
        );
        assert_eq!(
            ReplCommand::parse("drop").unwrap(),
            ReplCommand::Ui(UiCommand::InputDropped { paths: vec![] })
        );
    }

    #[test]
    fn test_json_command() {
        let cmd = ReplCommand::parse(r#"{"type":"cancel"}"#).unwrap();
        assert_eq!(cmd, ReplCommand::Ui(UiCommand::Cancel));
        assert!(matches!(
            ReplCommand::parse(r#"{"type":"explode"}"#),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_rejects_unknown() {
        assert_eq!(ReplCommand::parse(""), Err(ParseError::Empty));
        assert_eq!(
            ReplCommand::parse("fly"),
            Err(ParseError::Unknown("fly".into()))
        );
    }
}
