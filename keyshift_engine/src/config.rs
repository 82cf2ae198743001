// Pipeline configuration, loaded from JSON.
//
// A config file names an optional seed and the list of steps to run. Every
// option record has serde defaults, so a config only needs the fields it
// changes:
//
//   {
//     "seed": 42,
//     "steps": [
//       { "transform": "column_count", "options": { "target_keys": 7 } },
//       { "transform": "hold_duration", "options": {} }
//     ]
//   }
//
// The CLI's `--seed` flag overrides the file's seed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::Transform;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed seed; `None` picks one from the wall clock per run.
    pub seed: Option<u64>,
    pub steps: Vec<Transform>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
