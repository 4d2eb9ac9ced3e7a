use std::fmt;

use secrecy::{ExposeSecret, Secret, SecretString};
use serde::Deserialize;

/// A secret string that can be deserialized from configuration and never shows up in debug output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SerializableSecretString(SecretString);

impl ExposeSecret<String> for SerializableSecretString {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        SerializableSecretString(Secret::new(value))
    }
}

impl fmt::Debug for SerializableSecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let secret = SerializableSecretString::from("hunter2".to_string());

        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn deserializes_from_a_plain_string() {
        let secret: SerializableSecretString = serde_json::from_str("\"hunter2\"").unwrap();

        assert_eq!(secret.expose_secret(), "hunter2");
    }
}
