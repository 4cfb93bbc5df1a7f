use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, HISTORY_COMMAND, NO_ARG_COMMANDS, SELECTION_COMMANDS, SINGLE_PATH_COMMANDS,
};

/// Number of history entries shown when `/history` has no argument.
pub const DEFAULT_HISTORY_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn parse_history_count(arg: &str) -> Value {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Value::Number((DEFAULT_HISTORY_COUNT as u64).into());
    }
    match trimmed.parse::<u64>() {
        Ok(count) => Value::Number(count.into()),
        Err(_) => Value::Null,
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = remainder.trim();

            if let Some(action) = find_action(&command, SELECTION_COMMANDS) {
                let key = if action == "set_persona" {
                    "persona"
                } else {
                    "style"
                };
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert(key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if command == HISTORY_COMMAND.command {
                let mut intent = Intent::new(HISTORY_COMMAND.action, text);
                intent
                    .command_args
                    .insert("count".to_string(), parse_history_count(arg));
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    Intent::new("freeform", text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_intent, DEFAULT_HISTORY_COUNT};

    #[test]
    fn parse_selection_commands() {
        let persona = parse_intent("/persona Messi");
        assert_eq!(persona.action, "set_persona");
        assert_eq!(persona.command_args["persona"], json!("Messi"));

        let alias = parse_intent("/footballer both");
        assert_eq!(alias.action, "set_persona");
        assert_eq!(alias.command_args["persona"], json!("both"));

        let style = parse_intent("/style   Cinematic  ");
        assert_eq!(style.action, "set_style");
        assert_eq!(style.command_args["style"], json!("Cinematic"));
    }

    #[test]
    fn parse_upload_quoted_path() {
        let upload = parse_intent("/upload \"/tmp/my selfie.png\"");
        assert_eq!(upload.action, "upload");
        assert_eq!(upload.command_args["path"], json!("/tmp/my selfie.png"));

        let bare = parse_intent("/upload me.jpg");
        assert_eq!(bare.command_args["path"], json!("me.jpg"));
    }

    #[test]
    fn parse_save_without_dir_keeps_empty_path() {
        let save = parse_intent("/save");
        assert_eq!(save.action, "save");
        assert_eq!(save.command_args["path"], json!(""));
    }

    #[test]
    fn parse_history_counts() {
        let default = parse_intent("/history");
        assert_eq!(default.action, "history");
        assert_eq!(default.command_args["count"], json!(DEFAULT_HISTORY_COUNT));

        assert_eq!(parse_intent("/history 3").command_args["count"], json!(3));
        assert_eq!(
            parse_intent("/history lots").command_args["count"],
            json!(null)
        );
    }

    #[test]
    fn parse_no_arg_aliases() {
        assert_eq!(parse_intent("/generate").action, "generate");
        assert_eq!(parse_intent("/GO").action, "generate");
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("/status").action, "status");
    }

    #[test]
    fn parse_unknown_and_freeform() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));

        assert_eq!(parse_intent("make me famous").action, "freeform");
        assert_eq!(parse_intent("   ").action, "noop");
    }
}
