//! Movement commands and their one-byte wire codes.
//!
//! The device protocol has no framing, no payload and no acknowledgement:
//! every command is exactly one byte in `0..=7` written to the socket.
//!
//! | Command        | Code | Key   |
//! |----------------|------|-------|
//! | `Stop`         | 0    | space |
//! | `Forward`      | 1    | w     |
//! | `Backward`     | 2    | s     |
//! | `Left`         | 3    | a     |
//! | `Right`        | 4    | d     |
//! | `ForwardLeft`  | 5    | q     |
//! | `ForwardRight` | 6    | e     |
//! | `Spin`         | 7    | r     |

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Command {
    #[default]
    Stop = 0,
    Forward = 1,
    Backward = 2,
    Left = 3,
    Right = 4,
    ForwardLeft = 5,
    ForwardRight = 6,
    Spin = 7,
}

impl Command {
    /// Every command, ordered by wire code.
    pub const ALL: [Command; 8] = [
        Command::Stop,
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::ForwardLeft,
        Command::ForwardRight,
        Command::Spin,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Stop => "stop",
            Command::Forward => "forward",
            Command::Backward => "backward",
            Command::Left => "left",
            Command::Right => "right",
            Command::ForwardLeft => "forward-left",
            Command::ForwardRight => "forward-right",
            Command::Spin => "spin",
        }
    }

    /// Keyboard shortcut accepted by `FromStr`.
    pub fn key(self) -> char {
        match self {
            Command::Stop => ' ',
            Command::Forward => 'w',
            Command::Backward => 's',
            Command::Left => 'a',
            Command::Right => 'd',
            Command::ForwardLeft => 'q',
            Command::ForwardRight => 'e',
            Command::Spin => 'r',
        }
    }

    /// Status text shown to the operator while the command is active.
    pub fn friendly(self) -> &'static str {
        match self {
            Command::Stop => "Stopped",
            Command::Forward => "Driving forward",
            Command::Backward => "Driving backward",
            Command::Left => "Turning left",
            Command::Right => "Turning right",
            Command::ForwardLeft => "Driving forward left",
            Command::ForwardRight => "Driving forward right",
            Command::Spin => "Spinning",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Command> for u8 {
    fn from(c: Command) -> u8 {
        c.code()
    }
}

impl TryFrom<u8> for Command {
    type Error = SessionError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| SessionError::UnknownCommand(format!("code {code}")))
    }
}

impl FromStr for Command {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A bare space is the stop key; check it before trimming.
        if s == " " {
            return Ok(Command::Stop);
        }
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        let cmd = match norm.as_str() {
            "stop" | "x" => Command::Stop,
            "forward" | "w" => Command::Forward,
            "backward" | "back" | "s" => Command::Backward,
            "left" | "a" => Command::Left,
            "right" | "d" => Command::Right,
            "forward-left" | "q" => Command::ForwardLeft,
            "forward-right" | "e" => Command::ForwardRight,
            "spin" | "r" => Command::Spin,
            _ => return Err(SessionError::UnknownCommand(s.trim().to_string())),
        };
        Ok(cmd)
    }
}
