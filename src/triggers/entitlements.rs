//! License entitlement queries.

use std::collections::{HashMap, HashSet};

/// Quota capping how many workflows may have an active trigger.
pub const TRIGGER_LIMIT: &str = "quota:activeWorkflows";

/// Read-only view of what the current license allows.
pub trait Entitlements: Send + Sync {
    fn is_feature_enabled(&self, feature: &str) -> bool;

    /// Numeric quota, `None` when unlimited.
    fn quota(&self, quota: &str) -> Option<u64>;
}

/// Entitlements fixed at startup, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
    features: HashSet<String>,
    quotas: HashMap<String, u64>,
}

impl StaticEntitlements {
    /// Everything disabled, nothing limited.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn with_quota(mut self, quota: impl Into<String>, limit: u64) -> Self {
        self.quotas.insert(quota.into(), limit);
        self
    }
}

impl Entitlements for StaticEntitlements {
    fn is_feature_enabled(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    fn quota(&self, quota: &str) -> Option<u64> {
        self.quotas.get(quota).copied()
    }
}
