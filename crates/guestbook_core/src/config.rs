//! Lifecycle manager tuning.

use serde::{Deserialize, Serialize};

/// Behavior switches for `LifecycleManager`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Run a reconcile after every accepted insert.
    pub reconcile_after_submit: bool,
    /// Presentation hint: reconcile once before the first render.
    pub refresh_on_start: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            reconcile_after_submit: true,
            refresh_on_start: true,
        }
    }
}
