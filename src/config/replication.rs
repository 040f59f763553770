//! Replicated table set configuration

use serde::Deserialize;

use crate::domain::{is_safe_identifier, topic_for_table};

use super::error::ValidationError;

/// Tables under replication. Each table maps to one bus topic named
/// `<table>_changes`; the table must already carry the protocol columns
/// and have the capture triggers attached (`replication_enable`).
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Replicated table names
    pub tables: Vec<String>,
}

impl ReplicationConfig {
    /// Bus topics the consumer subscribes to
    pub fn topics(&self) -> Vec<String> {
        self.tables.iter().map(|t| topic_for_table(t)).collect()
    }

    /// Validate the table set
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::EmptyTableList);
        }
        for table in &self.tables {
            if !is_safe_identifier(table) {
                return Err(ValidationError::InvalidTableName(table.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_follow_table_names() {
        let config = ReplicationConfig {
            tables: vec!["users".to_string(), "orders".to_string()],
        };
        assert_eq!(config.topics(), vec!["users_changes", "orders_changes"]);
    }

    #[test]
    fn rejects_empty_table_list() {
        let config = ReplicationConfig { tables: vec![] };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unsafe_table_name() {
        let config = ReplicationConfig {
            tables: vec!["users; drop table users".to_string()],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_plain_table_names() {
        let config = ReplicationConfig {
            tables: vec!["users".to_string()],
        };
        assert!(config.validate().is_ok());
    }
}
