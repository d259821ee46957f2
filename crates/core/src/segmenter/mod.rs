//! Segmentation worker: splits acquired media into chunks via the external
//! media toolkit.

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::{SegmenterConfig, SilenceConfig};
pub use error::SegmenterError;
pub use ffmpeg::FfmpegSegmenter;
pub use traits::Segmenter;
pub use types::MediaInfo;
