use thiserror::Error;

pub const CONSOLE_HELP: &str =
    "commands: active | background | start | stop | restart | status | history | clear | quit";

/// Line commands accepted on stdin, standing in for host lifecycle callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Active,
    Background,
    Start,
    Stop,
    Restart,
    Status,
    History,
    Clear,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command `{0}`")]
pub struct UnknownCommand(pub String);

impl ConsoleCommand {
    /// Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, UnknownCommand> {
        let word = line.trim().to_ascii_lowercase();
        let command = match word.as_str() {
            "" => return Ok(None),
            "active" | "fg" | "foreground" => Self::Active,
            "background" | "bg" => Self::Background,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            "status" => Self::Status,
            "history" => Self::History,
            "clear" => Self::Clear,
            "quit" | "exit" | "q" => Self::Quit,
            _ => return Err(UnknownCommand(word)),
        };
        Ok(Some(command))
    }
}
