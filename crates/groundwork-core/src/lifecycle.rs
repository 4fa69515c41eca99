//! Task lifecycle tags

use serde::{Deserialize, Serialize};

/// How the engine treats a task relative to the live resource.
///
/// `Sync` is the normal create-or-update behavior. The other tags constrain
/// what the engine is allowed to do without removing the task from the graph,
/// so dependents still see the task reach a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// Create the resource if absent, update it if divergent
    #[default]
    Sync,
    /// Never touch the resource; the task is a no-op
    Ignore,
    /// The resource must already exist and match desired state exactly;
    /// absence or drift is a fatal error, never repaired
    ExistsAndValidates,
    /// A resource that already exists is left alone (drift is only logged);
    /// an absent resource is created
    ExistsIfPresent,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Ignore => "ignore",
            Self::ExistsAndValidates => "exists-and-validates",
            Self::ExistsIfPresent => "exists-if-present",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sync() {
        assert_eq!(Lifecycle::default(), Lifecycle::Sync);
    }

    #[test]
    fn test_serde_kebab_case() {
        let tag: Lifecycle = serde_json::from_str("\"exists-and-validates\"").unwrap();
        assert_eq!(tag, Lifecycle::ExistsAndValidates);
        assert_eq!(
            serde_json::to_string(&Lifecycle::Ignore).unwrap(),
            "\"ignore\""
        );
    }
}
