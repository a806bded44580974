/// Console commands understood by the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Ping,
    Shutdown,
    Eval,
    Debug,
}

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(Self::Ping),
            "shutdown" => Some(Self::Shutdown),
            "eval" => Some(Self::Eval),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    /// `eval` and `debug` do nothing without code to run.
    pub fn needs_body(self) -> bool {
        matches!(self, Self::Eval | Self::Debug)
    }
}

/// Split `content` into its first word and the remainder, the way a
/// whitespace split with a single cut behaves: leading whitespace is dropped
/// from both parts, trailing whitespace of the remainder is kept.
pub fn split_command(content: &str) -> Option<(&str, &str)> {
    let s = content.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(i) => Some((&s[..i], s[i..].trim_start())),
        None => Some((s, "")),
    }
}

/// Match `content` against `<prefix><command>`. Anything else is `None`.
pub fn parse_command<'a>(prefix: &str, content: &'a str) -> Option<(Command, &'a str)> {
    let (word, body) = split_command(content)?;
    let name = word.strip_prefix(prefix)?;
    let command = Command::from_name(name)?;
    Some((command, body))
}
