use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cards::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "zh-TW")]
    ZhTw,
    #[serde(rename = "en-US")]
    EnUs,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::ZhTw => "zh-TW",
            Language::EnUs => "en-US",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-tw" => Ok(Language::ZhTw),
            "en" | "en-us" => Ok(Language::EnUs),
            _ => Err(format!("Unknown language '{raw}'.")),
        }
    }
}

/// Round configuration owned by the caller; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSettings {
    pub use_timer: bool,
    pub use_voice: bool,
    pub difficulty: Difficulty,
    pub language: Language,
    pub multi_card_count: Option<usize>,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            use_timer: false,
            use_voice: true,
            difficulty: Difficulty::Easy,
            language: Language::ZhTw,
            multi_card_count: None,
        }
    }
}

impl RoundSettings {
    /// Explicit multi-mode count, or the difficulty's policy when unset.
    pub fn effective_card_count(&self) -> usize {
        self.multi_card_count
            .unwrap_or_else(|| self.difficulty.card_count())
    }

    /// Memorize phase length for timed multi-mode rounds.
    pub fn memorize_seconds(&self) -> Option<u64> {
        if !self.use_timer {
            return None;
        }
        Some(self.effective_card_count() as u64 * 2)
    }
}
