#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "menu",
        action: "menu",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
    CommandSpec {
        command: "difficulty",
        action: "set_difficulty",
    },
];

/// Shorthand answers for single-mode taps.
pub(crate) const REGION_ALIASES: &[(&str, &str)] = &[
    ("tl", "top-left"),
    ("tr", "top-right"),
    ("bl", "bottom-left"),
    ("br", "bottom-right"),
    ("c", "center"),
    ("centre", "center"),
];

pub const PLAY_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/menu",
    "/mode <single|multi>",
    "/difficulty [easy|medium|hard]",
    "/quit",
];
