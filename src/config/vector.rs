use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Vector backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum VectorConfig {
    /// No vector backend. Semantic and full-text search return
    /// `search_type_unavailable`.
    #[default]
    Disabled,

    /// PostgreSQL with the pgvector extension. Shares the primary
    /// Postgres database and provides both ANN and tsvector full-text
    /// search.
    #[cfg(feature = "database-postgres")]
    Pgvector(PgvectorConfig),
}

impl VectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            VectorConfig::Disabled => Ok(()),
            #[cfg(feature = "database-postgres")]
            VectorConfig::Pgvector(c) => c.validate(),
        }
    }
}

/// pgvector backend configuration.
#[cfg(feature = "database-postgres")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PgvectorConfig {
    /// Table name for per-entry embeddings.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Embedding vector dimensions. Must match the embedding source.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[cfg(feature = "database-postgres")]
impl Default for PgvectorConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            dimensions: default_dimensions(),
        }
    }
}

#[cfg(feature = "database-postgres")]
impl PgvectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.is_empty() {
            return Err(ConfigError::Validation(
                "vector.table_name cannot be empty".into(),
            ));
        }
        if self.dimensions == 0 || self.dimensions > 16000 {
            return Err(ConfigError::Validation(
                "vector.dimensions must be in 1..=16000".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "database-postgres")]
fn default_table_name() -> String {
    "entry_embeddings".to_string()
}

#[cfg(feature = "database-postgres")]
fn default_dimensions() -> usize {
    1536
}
