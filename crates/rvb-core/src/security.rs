use std::borrow::Cow;

use regex::{NoExpand, Regex, RegexBuilder};

use crate::{
    domain::{Session, UserId},
    errors::Error,
    Result,
};

// ============== Authorization ==============

/// Only the owner of the account may drive the console.
pub fn is_owner(author: &UserId, session: &Session) -> bool {
    !author.0.is_empty() && *author == session.owner_id
}

// ============== Secret Redaction ==============

/// Replacement text for redacted secrets.
pub const EXPUNGED: &str = "[EXPUNGED]";

/// Hides the active token in any text about to leave the process.
///
/// Matching is literal and case-insensitive.
#[derive(Clone, Debug)]
pub struct Redactor {
    pattern: Option<Regex>,
}

impl Redactor {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Ok(Self { pattern: None });
        }
        let pattern = RegexBuilder::new(&regex::escape(secret))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("cannot build token redactor: {e}")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        match &self.pattern {
            Some(re) => re.replace_all(input, NoExpand(EXPUNGED)),
            None => Cow::Borrowed(input),
        }
    }
}
