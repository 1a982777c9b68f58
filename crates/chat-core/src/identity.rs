use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Minimum display name length in characters, after trimming.
pub const MIN_DISPLAY_NAME_CHARS: usize = 2;
/// Maximum display name length in characters, after trimming.
pub const MAX_DISPLAY_NAME_CHARS: usize = 20;

/// A trimmed display name that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    /// Trim and validate a raw display name.
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let trimmed = raw.trim();
        let chars = trimmed.chars().count();

        if chars == 0 {
            return Err(ChatError::validation(
                "display_name_empty",
                "Please enter your name",
            ));
        }
        if chars < MIN_DISPLAY_NAME_CHARS {
            return Err(ChatError::validation(
                "display_name_too_short",
                format!("Name must be at least {MIN_DISPLAY_NAME_CHARS} characters"),
            ));
        }
        if chars > MAX_DISPLAY_NAME_CHARS {
            return Err(ChatError::validation(
                "display_name_too_long",
                format!("Name must be at most {MAX_DISPLAY_NAME_CHARS} characters"),
            ));
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DisplayName {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DisplayName> for String {
    fn from(value: DisplayName) -> Self {
        value.0
    }
}
