use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cut_points::Disposition;
use crate::segments::Segment;

/// Extension used when the source file has none.
pub const FALLBACK_EXTENSION: &str = "mp4";

/// What to do when a resolved output path already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave the existing file alone and do not split that segment.
    #[default]
    Skip,
    /// Let the external tool replace the existing file.
    Overwrite,
    /// Write next to it with a numeric suffix.
    Rename,
}

/// A collision between a resolved output path and an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    pub segment_index: usize,
    pub path: PathBuf,
    pub resolution: ConflictResolution,
}

/// How one [`PathConflict`] was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    Skipped,
    Overwritten,
    RenamedTo(PathBuf),
}

/// The output target chosen for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub segment: Segment,
    pub path: PathBuf,
    pub overwrite: bool,
}

/// Result of planning output paths for a set of segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPlan {
    pub outputs: Vec<PlannedOutput>,
    pub conflicts: Vec<PathConflict>,
}

/// Splits a source path into the base name and extension used for outputs.
///
/// # Example
/// ```
/// use splitter_engine::naming::source_name_parts;
///
/// assert_eq!(source_name_parts("/videos/movie.mp4"), ("movie".to_string(), "mp4".to_string()));
/// ```
pub fn source_name_parts(source: impl AsRef<Path>) -> (String, String) {
    let source = source.as_ref();
    let base = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let extension = source
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    (base, extension)
}

/// Maps one segment to its output file name.
///
/// # Example
/// ```
/// use splitter_engine::{Disposition, Segment};
/// use splitter_engine::naming::resolve_file_name;
///
/// let segment = Segment { index: 2, start_tl: 0, end_tl: 1, disposition: Disposition::Discard };
/// assert_eq!(resolve_file_name("movie", "mp4", &segment), "movie_segment_2_discard.mp4");
/// ```
pub fn resolve_file_name(base: &str, extension: &str, segment: &Segment) -> String {
    match segment.disposition {
        Disposition::Keep => format!("{base}_segment_{}.{extension}", segment.index),
        Disposition::Discard => format!("{base}_segment_{}_discard.{extension}", segment.index),
    }
}

/// Resolves output paths under `output_dir` and settles collisions.
///
/// `exists` answers whether a path is already taken on disk; it is the only
/// contact with the file system, so the planner itself stays pure. Paths
/// chosen earlier in the same plan count as taken too.
pub fn plan_output_paths<F>(
    output_dir: &Path,
    source: &Path,
    segments: &[Segment],
    policy: ConflictPolicy,
    exists: F,
) -> OutputPlan
where
    F: Fn(&Path) -> bool,
{
    let (base, extension) = source_name_parts(source);
    let mut taken = HashSet::<PathBuf>::new();
    let mut plan = OutputPlan::default();

    for segment in segments {
        let file_name = resolve_file_name(&base, &extension, segment);
        let path = output_dir.join(&file_name);
        let is_taken = |candidate: &Path| exists(candidate) || taken.contains(candidate);

        if !is_taken(&path) {
            taken.insert(path.clone());
            plan.outputs.push(PlannedOutput {
                segment: *segment,
                path,
                overwrite: false,
            });
            continue;
        }

        let resolution = match policy {
            ConflictPolicy::Skip => ConflictResolution::Skipped,
            ConflictPolicy::Overwrite => ConflictResolution::Overwritten,
            ConflictPolicy::Rename => {
                let renamed = (1..)
                    .map(|counter| output_dir.join(numbered_file_name(&file_name, counter)))
                    .find(|candidate| !is_taken(candidate))
                    .unwrap_or_else(|| path.clone());
                ConflictResolution::RenamedTo(renamed)
            }
        };
        warn!(
            segment_index = segment.index,
            path = ?path,
            ?resolution,
            "output path conflict"
        );

        match &resolution {
            ConflictResolution::Skipped => {}
            ConflictResolution::Overwritten => {
                taken.insert(path.clone());
                plan.outputs.push(PlannedOutput {
                    segment: *segment,
                    path: path.clone(),
                    overwrite: true,
                });
            }
            ConflictResolution::RenamedTo(renamed) => {
                taken.insert(renamed.clone());
                plan.outputs.push(PlannedOutput {
                    segment: *segment,
                    path: renamed.clone(),
                    overwrite: false,
                });
            }
        }
        plan.conflicts.push(PathConflict {
            segment_index: segment.index,
            path,
            resolution,
        });
    }

    plan
}

fn numbered_file_name(file_name: &str, counter: u32) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}_{counter}.{extension}"),
        None => format!("{file_name}_{counter}"),
    }
}
