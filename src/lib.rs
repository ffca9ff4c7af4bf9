//! Remove Sora video watermarks by blanking a configurable region.
//!
//! The watermark rectangle is anchored by percentage offsets with four corner
//! presets (Sora's usual placement is bottom-right), and a four-stage
//! pipeline (load, analyze, remove, finalize) hands the region to an external
//! ffmpeg engine as a `delogo` filter in the source's native resolution. A
//! Sora share-page URL can be resolved to a downloadable video first.
//!
//! # Quick Start
//!
//! ```no_run
//! use sora_watermark_removal::{
//!     CancelToken, FfmpegEngine, NullObserver, Session,
//! };
//!
//! let engine = FfmpegEngine::default();
//! let mut session = Session::new();
//! let data = std::fs::read("clip.mp4").unwrap();
//! session.accept_source("clip.mp4", "video/mp4", data).unwrap();
//! let output = session
//!     .process(&engine, &mut NullObserver, &CancelToken::new())
//!     .expect("removal failed");
//! std::fs::write("clip_no_watermark.mp4", output.data()).unwrap();
//! ```
//!
//! # Region configuration
//!
//! ```
//! use sora_watermark_removal::{Preset, RegionConfig};
//!
//! let mut region = RegionConfig::default();
//! region.apply_preset(Preset::TopLeft);
//! let spec = region.to_filter_spec(1920, 1080);
//! assert_eq!((spec.x, spec.y), (38, 21));
//! ```

#![deny(missing_docs)]

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod region;
pub mod remote;
pub mod session;

pub use engine::{EncodingSettings, FfmpegEngine, FrameDimensions, VideoEngine};
pub use error::{Error, Result};
pub use pipeline::{CancelToken, NullObserver, Pipeline, ProgressObserver, Stage};
pub use region::{FilterSpec, Preset, RegionConfig};
pub use remote::{
    manual_fallback_instructions, validate_page_url, MediaUrlExtractor, PatternExtractor,
    RemoteResolver, RemoteSource,
};
pub use session::{
    content_type_for_path, default_output_name, is_supported_video, ProcessedVideo, Session,
    SessionState, SourceVideo, MAX_SOURCE_BYTES,
};
