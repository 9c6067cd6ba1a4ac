//! Registry-wide settings.

use activerow_core::{Error, Result};
use serde::Deserialize;

/// Settings shared by every model in a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection used by models that do not name one.
    pub default_connection: String,
    /// Promote statement logging from `debug` to `info`.
    pub logging: bool,
    /// `strftime` format for DATETIME values in serialized output.
    pub date_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_connection: "development".to_string(),
            logging: false,
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl Config {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("Invalid configuration: {e}")))
    }

    #[must_use]
    pub fn default_connection(mut self, name: impl Into<String>) -> Self {
        self.default_connection = name.into();
        self
    }

    #[must_use]
    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    #[must_use]
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }
}
