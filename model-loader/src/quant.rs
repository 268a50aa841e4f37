//! Quantization policy.
//!
//! Decides which pre-quantized shard level a multi-file model loads with and
//! which in-place level adaptive and remote loads use. The decision depends
//! only on the descriptor's manifest and this policy, never on what happens
//! to be on disk, so the same descriptor always resolves the same way.

use common::{ModelDescriptor, QuantLevel, RequiredFile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::{LoadError, Result};

/// Configured quantization choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantPolicy {
    /// Shard levels in order of preference.
    pub preferred: Vec<QuantLevel>,
    /// Per-model level, keyed by model identifier.
    pub overrides: BTreeMap<String, QuantLevel>,
    /// In-place level for adaptive (on-the-fly) loads.
    pub adaptive: QuantLevel,
    /// In-place level for remote full-repository loads.
    pub remote: QuantLevel,
}

impl Default for QuantPolicy {
    fn default() -> Self {
        Self {
            // Mid/high quality first; the smallest levels are a last resort
            preferred: vec![
                QuantLevel::Q5K,
                QuantLevel::Q8_0,
                QuantLevel::Q4K,
                QuantLevel::Q6K,
                QuantLevel::Q5_0,
                QuantLevel::Q4_0,
                QuantLevel::AFQ8,
                QuantLevel::AFQ4,
                QuantLevel::F8E4M3,
                QuantLevel::Q8K,
            ],
            overrides: BTreeMap::new(),
            adaptive: QuantLevel::Q4K,
            remote: QuantLevel::Q8_0,
        }
    }
}

/// Shards chosen for a pre-quantized load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSelection {
    /// `None` when the shard names carry no recognizable level.
    pub level: Option<QuantLevel>,
    /// Relative shard paths in manifest order.
    pub shards: Vec<PathBuf>,
}

impl QuantPolicy {
    pub fn with_override(mut self, model_id: impl Into<String>, level: QuantLevel) -> Self {
        self.overrides.insert(model_id.into(), level);
        self
    }

    pub fn with_preferred(mut self, preferred: Vec<QuantLevel>) -> Self {
        self.preferred = preferred;
        self
    }

    /// Select the shard set for a multi-file descriptor.
    ///
    /// # Selection Priority
    /// 1. Per-model override, if the manifest declares that level
    /// 2. First entry of `preferred` the manifest declares
    /// 3. Highest-precision declared level (ties broken by name)
    ///
    /// # Errors
    /// `Classification` if the manifest declares no weight shard at all, or
    /// mixes shards with and without a recognizable level.
    pub fn select_shards(&self, descriptor: &ModelDescriptor) -> Result<ShardSelection> {
        let shards: Vec<&RequiredFile> = descriptor.weight_shards().collect();
        if shards.is_empty() {
            return Err(LoadError::Classification {
                model_id: descriptor.id.clone(),
                reason: "manifest declares no weight shards".to_string(),
            });
        }

        let declared: BTreeSet<QuantLevel> =
            shards.iter().filter_map(|s| s.quant_level()).collect();
        if declared.is_empty() {
            return Ok(ShardSelection {
                level: None,
                shards: shards.iter().map(|s| s.path.clone()).collect(),
            });
        }

        if shards.iter().any(|s| s.quant_level().is_none()) {
            return Err(LoadError::Classification {
                model_id: descriptor.id.clone(),
                reason: "weight shards mix quantized and unlabelled files".to_string(),
            });
        }

        let level = self.choose_level(&descriptor.id, &declared);
        log::debug!("{}: selected {} from {:?}", descriptor.id, level, declared);

        Ok(ShardSelection {
            level: Some(level),
            shards: shards
                .iter()
                .filter(|s| s.quant_level() == Some(level))
                .map(|s| s.path.clone())
                .collect(),
        })
    }

    fn choose_level(&self, model_id: &str, declared: &BTreeSet<QuantLevel>) -> QuantLevel {
        if let Some(level) = self.overrides.get(model_id) {
            if declared.contains(level) {
                return *level;
            }
            log::warn!(
                "Quantization override {} for '{}' ignored: not among declared shards",
                level,
                model_id
            );
        }

        if let Some(level) = self.preferred.iter().find(|l| declared.contains(*l)) {
            return *level;
        }

        // `declared` is non-empty here
        declared
            .iter()
            .copied()
            .max_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| b.as_str().cmp(a.as_str())))
            .unwrap_or(QuantLevel::Q4K)
    }
}
