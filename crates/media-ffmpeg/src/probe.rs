use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{MediaFfmpegError, Result};
use crate::tools::MediaTools;

/// Container names reported by `ffprobe` for the MP4 family demuxer.
const MP4_FAMILY_FORMATS: [&str; 3] = ["mov", "mp4", "m4a"];

/// Stream kind discovered by probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Stream metadata read from `ffprobe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
}

/// Media probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub format_name: Option<String>,
    pub streams: Vec<StreamInfo>,
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    /// Returns the first video stream.
    ///
    /// # Example
    /// ```no_run
    /// use media_ffmpeg::{MediaTools, probe_media};
    ///
    /// let info = probe_media(&MediaTools::default(), "sample.mp4").expect("probe should succeed");
    /// let _video = info.first_video().expect("video stream exists");
    /// ```
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    /// Returns the first audio stream.
    pub fn first_audio(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Audio)
    }

    /// Returns `true` when the demuxer belongs to the MP4/QuickTime family.
    pub fn is_mp4_family(&self) -> bool {
        self.format_name.as_deref().is_some_and(|names| {
            names
                .split(',')
                .any(|name| MP4_FAMILY_FORMATS.contains(&name.trim()))
        })
    }

    /// Returns the probed duration or an error when the container reports none.
    pub fn require_duration(&self) -> Result<f64> {
        self.duration_seconds
            .filter(|duration| duration.is_finite() && *duration > 0.0)
            .ok_or_else(|| MediaFfmpegError::MissingDuration(self.path.clone()))
    }
}

/// Probes a media file via `ffprobe`.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::{MediaTools, probe_media};
///
/// let info = probe_media(&MediaTools::default(), "sample.mp4").expect("probe should succeed");
/// assert!(!info.streams.is_empty());
/// ```
pub fn probe_media(tools: &MediaTools, path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();

    let output = tools
        .ffprobe_command()
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name",
            "-of",
            "compact=p=0:nk=0",
        ])
        .arg(path)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe stream probe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: command_for_display("ffprobe stream probe", path),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    let mut streams = Vec::new();
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        streams.push(parse_stream_line(line)?);
    }

    if streams.is_empty() {
        return Err(MediaFfmpegError::Parse {
            context: "streams",
            value: "no streams found".to_string(),
        });
    }

    let format = probe_format(tools, path)?;
    Ok(MediaInfo {
        path: path.to_path_buf(),
        format_name: format.format_name,
        streams,
        duration_seconds: format.duration_seconds,
    })
}

#[derive(Debug, Default, PartialEq)]
struct FormatInfo {
    format_name: Option<String>,
    duration_seconds: Option<f64>,
}

fn probe_format(tools: &MediaTools, path: &Path) -> Result<FormatInfo> {
    let output = tools
        .ffprobe_command()
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=format_name,duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe format probe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: command_for_display("ffprobe format probe", path),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    parse_format_output(&stdout)
}

fn parse_format_output(stdout: &str) -> Result<FormatInfo> {
    let mut info = FormatInfo::default();
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value == "N/A" {
            continue;
        }
        match key.trim() {
            "format_name" => info.format_name = Some(value.to_string()),
            "duration" => {
                let duration = value.parse::<f64>().map_err(|_| MediaFfmpegError::Parse {
                    context: "format duration seconds",
                    value: value.to_string(),
                })?;
                info.duration_seconds = Some(duration);
            }
            _ => {}
        }
    }
    Ok(info)
}

fn parse_stream_line(line: &str) -> Result<StreamInfo> {
    let mut map = HashMap::<&str, &str>::new();
    for field in line.split('|') {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "stream field",
                value: field.to_string(),
            })?;
        map.insert(key.trim(), unquote(value.trim()));
    }

    let kind = match map.get("codec_type").copied() {
        Some("video") => StreamKind::Video,
        Some("audio") => StreamKind::Audio,
        Some(_) => StreamKind::Other,
        None => {
            return Err(MediaFfmpegError::Parse {
                context: "codec_type",
                value: line.to_string(),
            });
        }
    };

    let index = map
        .get("index")
        .and_then(|value| value.parse::<u32>().ok())
        .ok_or_else(|| MediaFfmpegError::Parse {
            context: "stream index",
            value: line.to_string(),
        })?;

    Ok(StreamInfo {
        index,
        kind,
        codec_name: map
            .get("codec_name")
            .filter(|value| !value.is_empty() && **value != "N/A")
            .map(|value| value.to_string()),
    })
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

fn command_for_display(context: &str, path: &Path) -> String {
    format!("{context}: ffprobe {}", path.display())
}
