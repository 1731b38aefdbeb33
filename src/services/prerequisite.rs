//! Prerequisite resolution for gated resources. A resource unlocks when ANY
//! of its signals is satisfied (OR semantics), and progress toward unlock is
//! the best fraction any single signal has reached.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockSignal {
    pub name: String,
    pub satisfied: bool,
    /// 0..=100; how far along this signal is when not yet satisfied.
    #[serde(default)]
    pub progress_percent: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResolution {
    pub resource_id: String,
    pub unlocked: bool,
    pub progress_toward_unlock: i64,
    pub satisfied_by: Option<String>,
}

pub fn resolve(resource_id: &str, signals: &[UnlockSignal]) -> UnlockResolution {
    let satisfied_by = signals.iter().find(|s| s.satisfied).map(|s| s.name.clone());
    let unlocked = satisfied_by.is_some();

    let progress = if unlocked {
        100
    } else {
        signals
            .iter()
            .map(|s| s.progress_percent.clamp(0, 100))
            .max()
            .unwrap_or(0)
    };

    UnlockResolution {
        resource_id: resource_id.to_string(),
        unlocked,
        progress_toward_unlock: progress,
        satisfied_by,
    }
}
