//! Redaction of secret values.
//!
//! Passwords resolved for a connection never reach a log line, an error
//! message or serialized output in clear text.

use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A string wrapper that keeps its value out of logs.
///
/// `Display`, `Debug` and `Serialize` all render `[REDACTED]`. Use
/// [`expose`](SensitiveString::expose) where the real value is needed, such as
/// handing it to the transport.
///
/// # Example
///
/// ```rust
/// use winrm_exec::secrets::SensitiveString;
///
/// let password = SensitiveString::new("hunter2");
/// assert_eq!(format!("{}", password), "[REDACTED]");
/// assert_eq!(password.expose(), "hunter2");
/// ```
#[derive(Clone, Default)]
pub struct SensitiveString {
    value: String,
}

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The underlying value.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Replace every occurrence of this secret in `text` with `[REDACTED]`.
    ///
    /// Transport errors sometimes echo request data; messages built from them
    /// pass through here before they are logged or returned.
    pub fn redact_in(&self, text: &str) -> String {
        if self.value.is_empty() || !text.contains(&self.value) {
            return text.to_string();
        }
        text.replace(&self.value, REDACTED)
    }
}

impl fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString({})", REDACTED)
    }
}

// No Deref to str: reading the value always goes through expose()

impl From<String> for SensitiveString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SensitiveString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq for SensitiveString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SensitiveString {}

impl serde::Serialize for SensitiveString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> serde::Deserialize<'de> for SensitiveString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}
