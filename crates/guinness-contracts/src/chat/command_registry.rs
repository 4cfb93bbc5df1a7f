#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SELECTION_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "persona",
        action: "set_persona",
    },
    CommandSpec {
        command: "footballer",
        action: "set_persona",
    },
    CommandSpec {
        command: "style",
        action: "set_style",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "go",
        action: "generate",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
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

pub(crate) const HISTORY_COMMAND: CommandSpec = CommandSpec {
    command: "history",
    action: "history",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/persona <Ronaldo|Messi|Both>",
    "/style <Casual|Photorealistic|Cinematic|Professional>",
    "/upload <path>",
    "/generate",
    "/history [n]",
    "/save [dir]",
    "/status",
    "/help",
    "/quit",
];
