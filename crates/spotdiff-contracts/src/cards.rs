use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Region of a card where the visual difference is concentrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffLocation {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    #[default]
    Center,
}

impl DiffLocation {
    pub const ALL: [DiffLocation; 5] = [
        DiffLocation::TopLeft,
        DiffLocation::TopRight,
        DiffLocation::BottomLeft,
        DiffLocation::BottomRight,
        DiffLocation::Center,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiffLocation::TopLeft => "top-left",
            DiffLocation::TopRight => "top-right",
            DiffLocation::BottomLeft => "bottom-left",
            DiffLocation::BottomRight => "bottom-right",
            DiffLocation::Center => "center",
        }
    }

    /// Maps a tap on a `width` x `height` card to a region.
    ///
    /// The outer thirds split at half height into top/bottom corners; the
    /// middle third is always `Center`.
    pub fn from_tap(x: f64, y: f64, width: f64, height: f64) -> Self {
        let upper = y < height / 2.0;
        if x < width / 3.0 {
            if upper {
                DiffLocation::TopLeft
            } else {
                DiffLocation::BottomLeft
            }
        } else if x > width * 2.0 / 3.0 {
            if upper {
                DiffLocation::TopRight
            } else {
                DiffLocation::BottomRight
            }
        } else {
            DiffLocation::Center
        }
    }
}

impl fmt::Display for DiffLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffLocation {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        DiffLocation::ALL
            .into_iter()
            .find(|location| location.as_str() == normalized)
            .ok_or_else(|| format!("Unknown diff location '{raw}'."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }

    /// Visual complexity requested from the generator.
    pub fn style_guidance(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Very simple cute cartoon icon. Thick outlines, flat colors, white background. 1 object (e.g. apple, ball, cat). Minimal detail.",
            Difficulty::Medium => "Simple cute cartoon. Flat colors. 2 interacting characters or objects. Clear distinct shapes.",
            Difficulty::Hard => "Cute cartoon scene. 3-4 objects. Simple background elements. Flat vector style.",
        }
    }

    /// Total cards in a multi-mode set, target included.
    pub fn card_count(&self) -> usize {
        match self {
            Difficulty::Easy => 2,
            Difficulty::Medium => 4,
            Difficulty::Hard => 6,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium => Difficulty::Hard,
            Difficulty::Hard => Difficulty::Easy,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("Unknown difficulty '{raw}'.")),
        }
    }
}

/// One unit of game content. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    id: String,
    front_image: String,
    back_image: String,
    diff_description: String,
    diff_location: DiffLocation,
    prompt: String,
}

impl Card {
    /// A differential pair: `back_image` is `front_image` with one located change.
    pub fn pair(
        front_image: impl Into<String>,
        back_image: impl Into<String>,
        diff_description: impl Into<String>,
        diff_location: DiffLocation,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: new_card_id(),
            front_image: front_image.into(),
            back_image: back_image.into(),
            diff_description: diff_description.into(),
            diff_location,
            prompt: prompt.into(),
        }
    }

    /// A decoy with identical faces and no described difference.
    pub fn distractor(image: impl Into<String>, prompt: impl Into<String>) -> Self {
        let image = image.into();
        Self {
            id: new_card_id(),
            front_image: image.clone(),
            back_image: image,
            diff_description: String::new(),
            diff_location: DiffLocation::Center,
            prompt: prompt.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn front_image(&self) -> &str {
        &self.front_image
    }

    pub fn back_image(&self) -> &str {
        &self.back_image
    }

    pub fn diff_description(&self) -> &str {
        &self.diff_description
    }

    pub fn diff_location(&self) -> DiffLocation {
        self.diff_location
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_target(&self) -> bool {
        !self.diff_description.is_empty()
    }

    /// Easy rounds accept any tap.
    pub fn accepts_tap(&self, tapped: DiffLocation, difficulty: Difficulty) -> bool {
        difficulty == Difficulty::Easy || tapped == self.diff_location
    }
}

/// Index of the card carrying the difference in a multi-mode set.
pub fn find_target(cards: &[Card]) -> Option<usize> {
    cards.iter().position(Card::is_target)
}

pub fn is_target_pick(cards: &[Card], index: usize) -> bool {
    cards.get(index).map(Card::is_target).unwrap_or(false)
}

fn new_card_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
