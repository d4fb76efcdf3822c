//! Mapping from the model names clients ask for to Azure deployment names.

use std::collections::HashMap;

/// Read-only lookup table from source model identifiers to Azure deployments.
///
/// Built once from the configuration and shared by every request. Lookups never
/// fail: an unmapped model resolves to the default deployment.
#[derive(Debug, Clone)]
pub struct ModelMapper {
    mapping: HashMap<String, String>,
    default_model: String,
}

impl ModelMapper {
    pub fn new(mapping: HashMap<String, String>, default_model: impl Into<String>) -> Self {
        Self {
            mapping,
            default_model: default_model.into(),
        }
    }

    /// Resolve the deployment serving `source_model`.
    #[must_use]
    pub fn map(&self, source_model: &str) -> &str {
        self.mapping
            .get(source_model)
            .map_or(self.default_model.as_str(), String::as_str)
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// The mapping used when the configuration does not provide one.
#[must_use]
pub fn default_model_mapping() -> HashMap<String, String> {
    HashMap::from([
        (
            "claude-opus-4-5-20251101".to_string(),
            "gpt-4o".to_string(),
        ),
        (
            "claude-sonnet-4-5-20250929".to_string(),
            "gpt-4o-mini".to_string(),
        ),
    ])
}

pub const DEFAULT_DEPLOYMENT: &str = "gpt-4o-mini";
