mod command_registry;
mod input_parser;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use command_registry::PLAY_HELP_COMMANDS;
pub use input_parser::{parse_input, PlayerInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Single,
    Multi,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Single => "single",
            GameMode::Multi => "multi",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" | "s" => Ok(GameMode::Single),
            "multi" | "m" => Ok(GameMode::Multi),
            _ => Err(format!("Unknown mode '{raw}'.")),
        }
    }
}
