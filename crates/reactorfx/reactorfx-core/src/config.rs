//! Configuration for reactorfx-core.
//!
//! [`NexusConfig`] tunes the observation engine itself. [`RuntimeConfig`] is the
//! resolved project configuration handed to a strategy source at startup; how it
//! is discovered or merged is the host's business.

use serde::{Deserialize, Serialize};

/// Engine tuning knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
    /// Decimal digits kept when canonicalizing thresholds into a signature.
    pub threshold_precision: u32,
    /// Strip `mainClass`/`activeClass` from an element when its binding is removed.
    pub strip_classes_on_unbind: bool,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            threshold_precision: 4,
            strip_classes_on_unbind: true,
        }
    }
}

/// Paths the strategy source resolves strategies from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPaths {
    /// Project-relative main directory.
    pub main: String,
    /// Directory containing the animation strategies.
    pub animations: String,
}

/// Resolved runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub paths: ConfigPaths,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            paths: ConfigPaths {
                main: String::new(),
                animations: "/animations".into(),
            },
        }
    }
}

impl RuntimeConfig {
    /// Parse a runtime config from JSON, rejecting documents missing either path.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// The animations directory joined onto the main directory.
    pub fn animations_dir(&self) -> String {
        let main = self.paths.main.trim_end_matches('/');
        let anims = self.paths.animations.trim_start_matches('/');
        if main.is_empty() {
            format!("/{anims}")
        } else {
            format!("{main}/{anims}")
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.paths.animations.trim().is_empty()
    }
}
