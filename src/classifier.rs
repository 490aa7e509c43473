/// Prefix that marks a line as a bot command
pub const COMMAND_MARKER: char = '/';

/// The activation command
pub const START_COMMAND: &str = "/start";

/// Raw chat text split into command name and arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub raw_text: String,
    pub is_command: bool,
    /// Lower-cased first token for commands, empty for free text
    pub command_name: String,
    pub args: Vec<String>,
}

impl ClassifiedMessage {
    pub fn is_start(&self) -> bool {
        self.is_command && self.command_name == START_COMMAND
    }

    /// Arguments re-joined with single spaces
    pub fn args_text(&self) -> String {
        self.args.join(" ")
    }
}

/// Split text into `{is_command, command_name, args}`. Never fails.
pub fn classify(text: &str) -> ClassifiedMessage {
    let is_command = text.starts_with(COMMAND_MARKER);
    if !is_command {
        return ClassifiedMessage {
            raw_text: text.to_string(),
            is_command: false,
            command_name: String::new(),
            args: Vec::new(),
        };
    }

    // Only the first whitespace run separates the name from the rest
    let (name, rest) = match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], &text[pos..]),
        None => (text, ""),
    };

    ClassifiedMessage {
        raw_text: text.to_string(),
        is_command: true,
        command_name: name.to_lowercase(),
        args: rest.split_whitespace().map(str::to_string).collect(),
    }
}
