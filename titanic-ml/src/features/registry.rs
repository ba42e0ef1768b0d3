//! Registry of feature-group descriptions, persisted as one JSON document per region.

use crate::error::{PipelineError, Result};
use crate::features::definition::FeatureGroupDescription;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Registry of all feature groups in a region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureRegistry {
    pub groups: Vec<FeatureGroupDescription>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    /// Add a group. Names are unique.
    pub fn add_group(&mut self, group: FeatureGroupDescription) -> Result<()> {
        if self.find_group(&group.name).is_some() {
            return Err(PipelineError::AlreadyExists(format!(
                "Feature group '{}'",
                group.name
            )));
        }
        self.groups.push(group);
        Ok(())
    }

    pub fn find_group(&self, name: &str) -> Option<&FeatureGroupDescription> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn remove_group(&mut self, name: &str) -> bool {
        let len = self.groups.len();
        self.groups.retain(|g| g.name != name);
        self.groups.len() < len
    }

    /// Load from a JSON file; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(titanic_core::persistence::load_json(path)?.unwrap_or_default())
    }

    /// Save to a JSON file (atomic write).
    pub fn save(&self, path: &Path) -> Result<()> {
        titanic_core::persistence::atomic_write_json(path, self)?;
        Ok(())
    }
}
