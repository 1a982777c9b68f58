//! Line-oriented command parsing.

use std::{fmt, path::PathBuf};

/// Peer selection for `/join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    /// 1-based position in the last printed roster.
    Index(usize),
    /// Raw connection id.
    ConnectionId(String),
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Help,
    Users,
    Join(JoinTarget),
    Leave,
    Emoji(String),
    File(PathBuf),
    Image(PathBuf),
    History,
    Logout,
    Quit,
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    MissingArgument { command: &'static str, usage: &'static str },
    UnknownCommand(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArgument { command, usage } => {
                write!(f, "{command} needs an argument; usage: {usage}")
            }
            Self::UnknownCommand(command) => {
                write!(f, "unknown command '{command}'; try /help")
            }
        }
    }
}

pub const HELP: &str = "\
/users              list online peers
/join <n|id>        open a conversation with roster entry n or a connection id
/leave              close the active conversation
/emoji <glyph>      send an emoji
/file <path>        send a file
/image <path>       send an image
/history            print the active conversation
/logout             log out and wipe local data
/quit               exit without logging out
anything else is sent as a text message";

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<InputCommand>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(InputCommand::Text(line.to_owned())));
    };

    let (command, argument) = match rest.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (rest, ""),
    };

    let parsed = match command {
        "help" => InputCommand::Help,
        "users" => InputCommand::Users,
        "join" => {
            let argument = required("/join", "/join <n|id>", argument)?;
            match argument.parse::<usize>() {
                Ok(index) if index > 0 => InputCommand::Join(JoinTarget::Index(index)),
                _ => InputCommand::Join(JoinTarget::ConnectionId(argument.to_owned())),
            }
        }
        "leave" => InputCommand::Leave,
        "emoji" => InputCommand::Emoji(required("/emoji", "/emoji <glyph>", argument)?.to_owned()),
        "file" => InputCommand::File(PathBuf::from(required("/file", "/file <path>", argument)?)),
        "image" => {
            InputCommand::Image(PathBuf::from(required("/image", "/image <path>", argument)?))
        }
        "history" => InputCommand::History,
        "logout" => InputCommand::Logout,
        "quit" | "exit" => InputCommand::Quit,
        other => return Err(InputError::UnknownCommand(format!("/{other}"))),
    };
    Ok(Some(parsed))
}

fn required<'a>(
    command: &'static str,
    usage: &'static str,
    argument: &'a str,
) -> Result<&'a str, InputError> {
    if argument.is_empty() {
        Err(InputError::MissingArgument { command, usage })
    } else {
        Ok(argument)
    }
}
