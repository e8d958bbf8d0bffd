//! User input parsing.

/// Help text listing the console commands.
pub const HELP: &str =
    "/quit - quit the chat | /room <roomname> - change chat room | /user <username> - change user name | /sync - refresh";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text to publish in the current room.
    Message(String),
    Command(Command),
    /// Blank line; nothing to do.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Room(String),
    User(String),
    Sync,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("invalid command! {0}")]
    Unknown(String),
    #[error("{command} requires an argument")]
    MissingArgument { command: &'static str },
}

impl Input {
    /// Parse one line of user input. Lines starting with `/` are commands.
    ///
    /// Only the line terminator is stripped; message text and command
    /// arguments are kept verbatim.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Message(line.to_string()));
        };

        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));

        let command = match name {
            "quit" => Command::Quit,
            "sync" => Command::Sync,
            "help" => Command::Help,
            "room" => Command::Room(required(arg, "/room")?),
            "user" => Command::User(required(arg, "/user")?),
            _ => return Err(CommandError::Unknown(line.to_string())),
        };
        Ok(Self::Command(command))
    }
}

fn required(arg: &str, command: &'static str) -> Result<String, CommandError> {
    if arg.trim().is_empty() {
        Err(CommandError::MissingArgument { command })
    } else {
        Ok(arg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_plain_text_is_message() {
        assert_eq!(
            Input::parse("  hello there \r\n").unwrap(),
            Input::Message("  hello there ".into())
        );
        assert_eq!(Input::parse("   ").unwrap(), Input::Message("   ".into()));
        assert_eq!(Input::parse("\n").unwrap(), Input::Empty);
    }

    #[test]
    fn test_commands() {
        assert_eq!(Input::parse("/quit").unwrap(), Input::Command(Command::Quit));
        assert_eq!(Input::parse("/sync").unwrap(), Input::Command(Command::Sync));
        assert_eq!(Input::parse("/help").unwrap(), Input::Command(Command::Help));
        assert_eq!(
            Input::parse("/room rust lovers").unwrap(),
            Input::Command(Command::Room("rust lovers".into()))
        );
        assert_eq!(
            Input::parse("/user alice").unwrap(),
            Input::Command(Command::User("alice".into()))
        );
        assert_eq!(
            Input::parse("/room  padded ").unwrap(),
            Input::Command(Command::Room(" padded ".into()))
        );
    }

    #[test]
    fn test_missing_argument() {
        assert_matches!(
            Input::parse("/room"),
            Err(CommandError::MissingArgument { command: "/room" })
        );
        assert_matches!(
            Input::parse("/user   "),
            Err(CommandError::MissingArgument { command: "/user" })
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_matches!(Input::parse("/dance now"), Err(CommandError::Unknown(line)) if line == "/dance now");
        assert_eq!(
            CommandError::Unknown("/x".into()).to_string(),
            "invalid command! /x"
        );
    }
}
