//! Engine settings loaded from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use media_ffmpeg::MediaTools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batch::{SplitScope, default_worker_count};
use crate::cut_points::ToggleTarget;
use crate::error::{EngineError, Result};
use crate::naming::ConflictPolicy;
use crate::time::seconds_to_ticks;

/// Engine settings. Every field has a default, so partial files are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Tools
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,

    // Batch
    pub worker_count: usize,
    pub conflict_policy: ConflictPolicy,
    pub default_scope: SplitScope,
    pub batch_poll_interval_ms: u64,

    // Cut points
    pub duplicate_epsilon_seconds: f64,
    pub toggle_target: ToggleTarget,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            worker_count: default_worker_count(),
            conflict_policy: ConflictPolicy::default(),
            default_scope: SplitScope::default(),
            batch_poll_interval_ms: 50,
            duplicate_epsilon_seconds: 0.001,
            toggle_target: ToggleTarget::default(),
        }
    }
}

impl EngineConfig {
    /// Loads settings from `path`, or returns defaults when the file is missing.
    ///
    /// # Example
    /// ```no_run
    /// use splitter_engine::EngineConfig;
    ///
    /// let config = EngineConfig::load("splitter.json").expect("config should parse");
    /// assert!(config.worker_count >= 1);
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = ?path, "engine config missing, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            context: "read engine config",
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| EngineError::ConfigSerialization {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json =
            serde_json::to_string_pretty(self).map_err(|source| EngineError::ConfigSerialization {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, json).map_err(|source| EngineError::ConfigIo {
            context: "write engine config",
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn media_tools(&self) -> MediaTools {
        MediaTools::new(&self.ffmpeg_path, &self.ffprobe_path)
    }

    /// Duplicate-suppression window in timeline ticks.
    pub fn duplicate_epsilon_tl(&self) -> i64 {
        seconds_to_ticks(self.duplicate_epsilon_seconds)
            .unwrap_or(0)
            .max(0)
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(EngineError::InvalidParameter {
                name: "worker count",
                value: 0.0,
                reason: "at least one worker is required",
            });
        }
        if !self.duplicate_epsilon_seconds.is_finite() || self.duplicate_epsilon_seconds < 0.0 {
            return Err(EngineError::InvalidParameter {
                name: "duplicate epsilon",
                value: self.duplicate_epsilon_seconds,
                reason: "epsilon must be a non-negative number of seconds",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::EngineConfig;
    use crate::batch::SplitScope;
    use crate::cut_points::ToggleTarget;
    use crate::error::EngineError;
    use crate::naming::ConflictPolicy;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert!((1..=4).contains(&config.worker_count));
        assert_eq!(config.duplicate_epsilon_tl(), 1_000);
        assert_eq!(config.toggle_target, ToggleTarget::LatestTimestamp);
        assert_eq!(config.conflict_policy, ConflictPolicy::Skip);
        assert_eq!(config.default_scope, SplitScope::KeepOnly);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = EngineConfig::load(dir.path().join("absent.json")).expect("load");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("splitter.json");
        fs::write(
            &path,
            r#"{ "worker_count": 2, "toggle_target": "most_recently_inserted", "conflict_policy": "rename" }"#,
        )
        .expect("write config");

        let config = EngineConfig::load(&path).expect("load");

        assert_eq!(config.worker_count, 2);
        assert_eq!(config.toggle_target, ToggleTarget::MostRecentlyInserted);
        assert_eq!(config.conflict_policy, ConflictPolicy::Rename);
        assert_eq!(config.ffmpeg_path, EngineConfig::default().ffmpeg_path);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("splitter.json");
        let config = EngineConfig {
            worker_count: 3,
            default_scope: SplitScope::KeepAndDiscard,
            ..EngineConfig::default()
        };

        config.save(&path).expect("save");
        assert_eq!(EngineConfig::load(&path).expect("load"), config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("splitter.json");
        fs::write(&path, r#"{ "worker_count": 0 }"#).expect("write config");
        assert!(matches!(
            EngineConfig::load(&path),
            Err(EngineError::InvalidParameter { .. })
        ));

        fs::write(&path, r#"{ "worker_count": "many" }"#).expect("write config");
        assert!(matches!(
            EngineConfig::load(&path),
            Err(EngineError::ConfigSerialization { .. })
        ));
    }
}
