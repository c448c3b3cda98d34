mod error;
mod probe;
mod split;
mod tools;

pub use error::{MediaFfmpegError, Result};
pub use probe::{MediaInfo, StreamInfo, StreamKind, probe_media};
pub use split::{StreamCopyExit, StreamCopyRequest, run_stream_copy, stream_copy_args};
pub use tools::MediaTools;
