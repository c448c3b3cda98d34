use std::path::PathBuf;
use std::process::Command;

/// Locations of the FFmpeg command line tools.
///
/// Both default to the bare program names so they are resolved through `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl MediaTools {
    /// Creates tool locations from explicit paths.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::MediaTools;
    ///
    /// let tools = MediaTools::new("/opt/ffmpeg/bin/ffmpeg", "/opt/ffmpeg/bin/ffprobe");
    /// assert!(tools.ffmpeg.ends_with("ffmpeg"));
    /// ```
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub(crate) fn ffmpeg_command(&self) -> Command {
        Command::new(&self.ffmpeg)
    }

    pub(crate) fn ffprobe_command(&self) -> Command {
        Command::new(&self.ffprobe)
    }
}
