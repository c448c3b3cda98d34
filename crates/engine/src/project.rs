use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cut_points::{CutPoint, Disposition};
use crate::error::{EngineError, Result};
use crate::time::{seconds_to_ticks, ticks_to_seconds};

/// Conventional extension of project files.
pub const PROJECT_FILE_EXTENSION: &str = "mp4proj";

/// Persisted project state: the source video and its cut points.
///
/// Segments are not stored; they are derived again after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub source_video_path: PathBuf,
    pub cut_points: Vec<CutPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    source_video_path: PathBuf,
    #[serde(default)]
    cut_points: Vec<CutPointRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CutPointRecord {
    /// Seconds from the start of the source video.
    timestamp: f64,
    #[serde(default)]
    disposition: Disposition,
}

impl Project {
    pub fn new(source_video_path: impl Into<PathBuf>, cut_points: Vec<CutPoint>) -> Self {
        Self {
            source_video_path: source_video_path.into(),
            cut_points,
        }
    }

    /// Writes the project as pretty-printed JSON.
    ///
    /// # Example
    /// ```no_run
    /// use splitter_engine::{CutPoint, Project};
    ///
    /// let project = Project::new("movie.mp4", vec![CutPoint::keep(5_000_000)]);
    /// project.save("movie.mp4proj").expect("project file should be writable");
    /// ```
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json(path)?;
        fs::write(path, json).map_err(|source| EngineError::ProjectIo {
            context: "write project file",
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = ?path,
            cut_points = self.cut_points.len(),
            "project saved"
        );
        Ok(())
    }

    /// Reads a project file.
    ///
    /// Cut points are returned in timestamp order. Negative timestamps and
    /// repeated timestamps are rejected with `InvalidProjectFile`. Whether the
    /// source video still exists is checked separately by
    /// [`Project::ensure_source_exists`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| EngineError::ProjectIo {
            context: "read project file",
            path: path.to_path_buf(),
            source,
        })?;
        let project = Self::from_json(&json, path)?;
        debug!(
            path = ?path,
            source = ?project.source_video_path,
            cut_points = project.cut_points.len(),
            "project loaded"
        );
        Ok(project)
    }

    /// Fails with `MissingSourceVideo` when the referenced video is gone.
    pub fn ensure_source_exists(&self) -> Result<()> {
        if self.source_video_path.is_file() {
            Ok(())
        } else {
            Err(EngineError::MissingSourceVideo(
                self.source_video_path.clone(),
            ))
        }
    }

    fn to_json(&self, path: &Path) -> Result<String> {
        let file = ProjectFile {
            source_video_path: self.source_video_path.clone(),
            cut_points: self
                .cut_points
                .iter()
                .map(|point| CutPointRecord {
                    timestamp: ticks_to_seconds(point.at_tl),
                    disposition: point.disposition,
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file).map_err(|source| EngineError::ProjectSerialization {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_json(json: &str, path: &Path) -> Result<Self> {
        let file: ProjectFile =
            serde_json::from_str(json).map_err(|source| EngineError::ProjectSerialization {
                path: path.to_path_buf(),
                source,
            })?;
        if file.source_video_path.as_os_str().is_empty() {
            return Err(EngineError::InvalidProjectFile {
                reason: "source video path is empty".to_string(),
            });
        }

        let mut cut_points = Vec::with_capacity(file.cut_points.len());
        for record in &file.cut_points {
            let at_tl = seconds_to_ticks(record.timestamp)
                .filter(|at_tl| *at_tl >= 0)
                .ok_or_else(|| EngineError::InvalidProjectFile {
                    reason: format!("invalid cut point timestamp {}", record.timestamp),
                })?;
            cut_points.push(CutPoint::new(at_tl, record.disposition));
        }
        cut_points.sort_by_key(|point| point.at_tl);
        if let Some(pair) = cut_points
            .windows(2)
            .find(|pair| pair[0].at_tl == pair[1].at_tl)
        {
            return Err(EngineError::InvalidProjectFile {
                reason: format!(
                    "duplicate cut point timestamp {}",
                    ticks_to_seconds(pair[1].at_tl)
                ),
            });
        }

        Ok(Self {
            source_video_path: file.source_video_path,
            cut_points,
        })
    }
}
