use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::BackendError;

/// Normalizes a display name by stripping surrounding whitespace and
/// composing it into Unicode Normalization Form C.
///
/// ```
/// use studio::normalization::normalize_name;
/// assert_eq!(normalize_name(" Ann "), "Ann");
/// ```
pub fn normalize_name(name: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    name.as_ref().trim().nfc().collect()
}

/// Deserializes a `String` after running it through `normalize_name`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_name(s))
}

/// A requester’s email in canonical form: trimmed, composed into NFC
/// and lowercased. Two addresses that differ only in case, surrounding
/// whitespace or Unicode composition identify the same requester.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Canonicalizes `raw`, rejecting blank input and input without an `@`.
    ///
    /// ```
    /// use studio::normalization::Email;
    /// let email = Email::parse(" Ann@Example.COM ").unwrap();
    /// assert_eq!(email.as_str(), "ann@example.com");
    /// ```
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, BackendError> {
        use unicode_normalization::UnicodeNormalization;

        let trimmed = raw.as_ref().trim();

        if trimmed.is_empty() {
            return Err(BackendError::InvalidRequester("email must not be empty"));
        }

        if !trimmed.contains('@') {
            return Err(BackendError::InvalidRequester("email must contain @"));
        }

        let composed: String = trimmed.nfc().collect();

        Ok(Email(composed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
