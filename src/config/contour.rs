//! Contour identity configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Identity of this deployment, stamped into every published event's
/// `source` descriptor and compared against incoming events to drop
/// own-origin messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ContourConfig {
    /// Contour name, e.g. "A" or "east"
    pub name: String,

    /// Logical database label carried in the event source descriptor
    #[serde(default = "default_database_label")]
    pub database: String,
}

impl ContourConfig {
    /// Validate contour identity
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingContourName);
        }
        Ok(())
    }
}

fn default_database_label() -> String {
    "primary".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        let config = ContourConfig {
            name: "  ".to_string(),
            database: default_database_label(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_named_contour() {
        let config = ContourConfig {
            name: "A".to_string(),
            database: "primary".to_string(),
        };
        assert!(config.validate().is_ok());
    }
}
