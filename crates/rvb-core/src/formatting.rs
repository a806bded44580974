//! Formatting utilities (pagination, code fences, outbound decoration).

/// Glyph wrapped around every outbound message (SMILING FACE WITH OPEN MOUTH).
pub const DECORATION: &str = "\u{1F603}";

/// Language tag used for console output blocks.
pub const CODE_LANG: &str = "lua";

/// Options for [`pagify`].
#[derive(Clone, Debug)]
pub struct PagifyOptions {
    /// Preferred split points, searched backwards from the page boundary.
    pub delims: Vec<String>,
    /// Take the first delimiter (in order) that matches instead of the rightmost one.
    pub priority: bool,
    /// Room reserved for markup the caller wraps around each page.
    pub shorten_by: usize,
    pub page_length: usize,
}

impl Default for PagifyOptions {
    fn default() -> Self {
        Self {
            delims: vec!["\n".to_string()],
            priority: false,
            shorten_by: 12,
            page_length: 2000,
        }
    }
}

impl PagifyOptions {
    /// Default options for a messenger with the given message size limit.
    pub fn with_page_length(page_length: usize) -> Self {
        Self {
            page_length,
            ..Self::default()
        }
    }

    /// Maximum characters per page (never zero, so pagination always advances).
    pub fn limit(&self) -> usize {
        self.page_length.saturating_sub(self.shorten_by).max(1)
    }
}

/// Lazily split `text` into pages of at most `opts.limit()` characters.
///
/// Pages end right before a delimiter when one is found after the first
/// character; otherwise they are cut hard at the limit. Blank pages are
/// skipped. The delimiter itself stays at the start of the following page.
pub fn pagify(text: &str, opts: PagifyOptions) -> Pages<'_> {
    Pages {
        rest: text,
        limit: opts.limit(),
        delims: opts.delims,
        priority: opts.priority,
    }
}

/// Iterator returned by [`pagify`].
#[derive(Debug)]
pub struct Pages<'a> {
    rest: &'a str,
    limit: usize,
    delims: Vec<String>,
    priority: bool,
}

impl<'a> Pages<'a> {
    /// Byte offset at which the current page ends; `boundary` is the byte
    /// offset of the `limit`-th character.
    fn split_point(&self, boundary: usize) -> usize {
        let window = &self.rest[..boundary];
        // Position 0 never counts as a split point.
        let start = window.chars().next().map(char::len_utf8).unwrap_or(0);
        let searchable = &window[start..];

        let mut found = self
            .delims
            .iter()
            .map(|d| searchable.rfind(d.as_str()).map(|i| i + start));

        let closest = if self.priority {
            found.find_map(|pos| pos)
        } else {
            found.flatten().max()
        };
        closest.unwrap_or(boundary)
    }
}

impl<'a> Iterator for Pages<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            let Some((boundary, _)) = self.rest.char_indices().nth(self.limit) else {
                let last = std::mem::take(&mut self.rest);
                return (!last.trim().is_empty()).then_some(last);
            };

            let (page, rest) = self.rest.split_at(self.split_point(boundary));
            self.rest = rest;
            if !page.trim().is_empty() {
                return Some(page);
            }
        }
    }
}

/// Remove markdown code fences from user input.
///
/// ```` ```lua\ncode\n``` ```` and ```` ```\ncode\n``` ```` lose their fences;
/// inline `` `code` `` loses surrounding backticks, spaces and newlines.
pub fn strip_code_fences(content: &str) -> &str {
    if content.starts_with("```") && content.ends_with("```") {
        let rest = &content[3..];
        let rest = match rest.strip_prefix(CODE_LANG) {
            Some(after) if after.starts_with(char::is_whitespace) => after,
            _ => rest,
        };
        // When the opening fence overlapped the closing one, nothing is left.
        return rest.strip_suffix("```").unwrap_or("");
    }

    content.trim_matches(|c| c == '`' || c == ' ' || c == '\n')
}

/// Wrap one page of console output in a fenced block.
pub fn code_block(page: &str) -> String {
    format!("```{CODE_LANG}\n{page}\n```")
}

/// Frame outbound content between two decoration glyphs.
pub fn decorate(content: &str) -> String {
    format!("{DECORATION}\n{content}\n{DECORATION}")
}
