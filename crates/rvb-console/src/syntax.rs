//! Caret-pointing display for compile errors.

use std::sync::OnceLock;

use regex::Regex;

/// Format a Lua syntax error against the user's source.
///
/// `line_offset` is the number of wrapper lines compiled in front of the
/// user's code. The output shows the offending line, a caret under the token
/// Lua complained about, then `SyntaxError: <message>`. When the line can not
/// be located the display degrades to the message alone.
pub fn describe(raw_message: &str, source: &str, line_offset: usize) -> String {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    static NEAR: OnceLock<Regex> = OnceLock::new();
    let location =
        LOCATION.get_or_init(|| Regex::new(r"(?s)^[^\n]*?:(\d+): (.*)$").expect("valid regex"));
    let near = NEAR.get_or_init(|| Regex::new(r"near '(.+)'$").expect("valid regex"));

    let Some(caps) = location.captures(raw_message.trim_end()) else {
        return format!("SyntaxError: {}", raw_message.trim_end());
    };
    let message = caps[2].to_string();
    let reported = caps[1].parse::<usize>().unwrap_or(0);

    let line = reported
        .checked_sub(line_offset)
        .filter(|n| *n >= 1)
        .and_then(|n| source.lines().nth(n - 1));
    let Some(line) = line else {
        return format!("SyntaxError: {message} (line {reported})");
    };

    // 1-based column of the last occurrence of the token, or just past the
    // end of the line. The parser stops at the rightmost match.
    let column = near
        .captures(&message)
        .and_then(|c| line.rfind(&c[1]))
        .map(|byte| line[..byte].chars().count() + 1)
        .unwrap_or_else(|| line.chars().count() + 1);

    format!(
        "{line}\n{caret:>column$}\nSyntaxError: {message} (line {n})",
        caret = "^",
        n = reported - line_offset,
    )
}
