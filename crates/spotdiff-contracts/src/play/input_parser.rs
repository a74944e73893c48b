use crate::cards::{DiffLocation, Difficulty};

use super::command_registry::{CommandSpec, ARG_COMMANDS, NO_ARG_COMMANDS, REGION_ALIASES};
use super::GameMode;

/// One line of player input at the terminal round controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    Noop,
    Help,
    /// Back to the menu; the session drops any prefetched content.
    Menu,
    Quit,
    SetMode(GameMode),
    /// `None` cycles to the next difficulty.
    SetDifficulty(Option<Difficulty>),
    Tap(DiffLocation),
    /// Zero-based card index; typed 1-based.
    Pick(usize),
    Invalid(String),
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_region(raw: &str) -> Option<DiffLocation> {
    let lowered = raw.trim().to_ascii_lowercase();
    let expanded = REGION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, tag)| (*tag).to_string())
        .unwrap_or(lowered);
    expanded.parse().ok()
}

/// `x,y` as percentages of the card face, origin top-left.
fn parse_point(raw: &str) -> Option<Result<DiffLocation, String>> {
    let (x, y) = raw.split_once(',')?;
    let (Ok(x), Ok(y)) = (x.trim().parse::<f64>(), y.trim().parse::<f64>()) else {
        return Some(Err(format!("Not a tap position: '{raw}'.")));
    };
    let on_card = |value: f64| (0.0..=100.0).contains(&value);
    if !on_card(x) || !on_card(y) {
        return Some(Err("Tap positions run from 0 to 100.".to_string()));
    }
    Some(Ok(DiffLocation::from_tap(x, y, 100.0, 100.0)))
}

pub fn parse_input(text: &str) -> PlayerInput {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return PlayerInput::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        let command = slash_tail[..command_len].to_ascii_lowercase();
        let arg = slash_tail[command_len..].trim();

        if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
            return match action {
                "help" => PlayerInput::Help,
                "menu" => PlayerInput::Menu,
                _ => PlayerInput::Quit,
            };
        }

        if let Some(action) = find_action(&command, ARG_COMMANDS) {
            if action == "set_mode" {
                return match arg.parse::<GameMode>() {
                    Ok(mode) => PlayerInput::SetMode(mode),
                    Err(message) => PlayerInput::Invalid(message),
                };
            }
            if arg.is_empty() {
                return PlayerInput::SetDifficulty(None);
            }
            return match arg.parse::<Difficulty>() {
                Ok(difficulty) => PlayerInput::SetDifficulty(Some(difficulty)),
                Err(message) => PlayerInput::Invalid(message),
            };
        }

        return PlayerInput::Unknown {
            command,
            arg: arg.to_string(),
        };
    }

    if let Some(point) = parse_point(raw_trimmed) {
        return match point {
            Ok(location) => PlayerInput::Tap(location),
            Err(message) => PlayerInput::Invalid(message),
        };
    }

    if let Ok(number) = raw_trimmed.parse::<usize>() {
        if number == 0 {
            return PlayerInput::Invalid("Cards are numbered from 1.".to_string());
        }
        return PlayerInput::Pick(number - 1);
    }

    match parse_region(raw_trimmed) {
        Some(location) => PlayerInput::Tap(location),
        None => PlayerInput::Invalid(format!(
            "Not a region, tap position or card number: '{raw_trimmed}'."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_input, PlayerInput};
    use crate::cards::{DiffLocation, Difficulty};
    use crate::play::GameMode;

    #[test]
    fn parse_region_answers_and_aliases() {
        assert_eq!(parse_input("tl"), PlayerInput::Tap(DiffLocation::TopLeft));
        assert_eq!(
            parse_input("  Bottom-Right "),
            PlayerInput::Tap(DiffLocation::BottomRight)
        );
        assert_eq!(parse_input("c"), PlayerInput::Tap(DiffLocation::Center));
    }

    #[test]
    fn parse_tap_positions_map_to_regions() {
        assert_eq!(parse_input("10,20"), PlayerInput::Tap(DiffLocation::TopLeft));
        assert_eq!(parse_input("90, 80"), PlayerInput::Tap(DiffLocation::BottomRight));
        assert_eq!(parse_input("50,50"), PlayerInput::Tap(DiffLocation::Center));
        assert_eq!(parse_input("0,100"), PlayerInput::Tap(DiffLocation::BottomLeft));
        assert!(matches!(parse_input("120,5"), PlayerInput::Invalid(_)));
        assert!(matches!(parse_input("-1,5"), PlayerInput::Invalid(_)));
        assert!(matches!(parse_input("left,top"), PlayerInput::Invalid(_)));
    }

    #[test]
    fn parse_card_picks_are_one_based() {
        assert_eq!(parse_input("1"), PlayerInput::Pick(0));
        assert_eq!(parse_input("6"), PlayerInput::Pick(5));
        assert!(matches!(parse_input("0"), PlayerInput::Invalid(_)));
    }

    #[test]
    fn parse_slash_commands() {
        assert_eq!(parse_input(""), PlayerInput::Noop);
        assert_eq!(parse_input("/help"), PlayerInput::Help);
        assert_eq!(parse_input("/menu"), PlayerInput::Menu);
        assert_eq!(parse_input("/exit"), PlayerInput::Quit);
        assert_eq!(
            parse_input("/mode multi"),
            PlayerInput::SetMode(GameMode::Multi)
        );
        assert_eq!(parse_input("/difficulty"), PlayerInput::SetDifficulty(None));
        assert_eq!(
            parse_input("/difficulty HARD"),
            PlayerInput::SetDifficulty(Some(Difficulty::Hard))
        );
        assert!(matches!(parse_input("/mode both"), PlayerInput::Invalid(_)));
    }

    #[test]
    fn parse_unknown_command_and_garbage() {
        assert_eq!(
            parse_input("/magic foo bar"),
            PlayerInput::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
        assert!(matches!(parse_input("banana"), PlayerInput::Invalid(_)));
    }
}
