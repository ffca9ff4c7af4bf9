//! Session state and resource lifecycle.
//!
//! A [`Session`] owns at most one source video and one processed output at a
//! time, and is always in exactly one of four states. Byte buffers are held
//! behind shared handles; every handle the session creates is released on
//! [`Session::reset`] or when a new source supersedes it, so nothing outlives
//! the session that created it.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::engine::VideoEngine;
use crate::error::{Error, Result};
use crate::pipeline::{CancelToken, Pipeline, ProgressObserver};
use crate::region::RegionConfig;

/// Maximum accepted source size: 500 MiB.
pub const MAX_SOURCE_BYTES: u64 = 500 * 1024 * 1024;

/// The four session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No source accepted.
    #[default]
    Idle,
    /// A source is loaded and the region may be edited.
    Configuring,
    /// A pipeline run is in flight.
    Processing,
    /// A processed output is available.
    Previewing,
}

/// An accepted source video: opaque bytes plus metadata.
#[derive(Debug, Clone)]
pub struct SourceVideo {
    name: String,
    content_type: String,
    data: Arc<Vec<u8>>,
}

impl SourceVideo {
    /// Validate and wrap an uploaded file.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedMediaType`] unless the MIME type starts with
    /// `video/`; [`Error::FileTooLarge`] above 500 MiB. Neither error has any
    /// side effect on session state.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self> {
        let content_type = content_type.into();
        if !content_type.starts_with("video/") {
            return Err(Error::UnsupportedMediaType { mime: content_type });
        }
        let size = data.len() as u64;
        if size > MAX_SOURCE_BYTES {
            return Err(Error::FileTooLarge {
                size_bytes: size,
                limit_bytes: MAX_SOURCE_BYTES,
            });
        }
        Ok(Self {
            name: name.into(),
            content_type,
            data: Arc::new(data),
        })
    }

    /// Original file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type as reported at upload.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// The raw bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The shared byte handle, e.g. for preview surfaces. Dropped handles
    /// are the caller's own; the session releases its copy on reset.
    #[must_use]
    pub fn data_handle(&self) -> &Arc<Vec<u8>> {
        &self.data
    }
}

/// The processed artifact. Always `video/mp4` in this design.
#[derive(Debug, Clone)]
pub struct ProcessedVideo {
    data: Arc<Vec<u8>>,
}

impl ProcessedVideo {
    /// Wrap engine output bytes as the session artifact.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    /// The MIME type of the artifact.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        "video/mp4"
    }

    /// Size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// The raw bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The shared byte handle.
    #[must_use]
    pub fn data_handle(&self) -> &Arc<Vec<u8>> {
        &self.data
    }
}

/// One user session: state, current source, current output, region config.
///
/// Taking `&mut self` for [`Session::process`] means a session can never run
/// two pipelines concurrently; each engine instance sees at most one
/// in-flight removal per session.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    source: Option<SourceVideo>,
    output: Option<ProcessedVideo>,
    region: RegionConfig,
}

impl Session {
    /// Create an idle session with the default region config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The region config.
    #[must_use]
    pub fn region(&self) -> &RegionConfig {
        &self.region
    }

    /// Mutable access to the region config for field edits and presets.
    pub fn region_mut(&mut self) -> &mut RegionConfig {
        &mut self.region
    }

    /// The accepted source, if any.
    #[must_use]
    pub fn source(&self) -> Option<&SourceVideo> {
        self.source.as_ref()
    }

    /// The processed output, if any.
    #[must_use]
    pub fn output(&self) -> Option<&ProcessedVideo> {
        self.output.as_ref()
    }

    /// Accept a new source file, releasing any previous source and output
    /// and restoring the region config to defaults.
    ///
    /// # Errors
    ///
    /// Validation errors from [`SourceVideo::new`] are returned without
    /// altering session state.
    pub fn accept_source(
        &mut self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<()> {
        let source = SourceVideo::new(name, content_type, data)?;
        info!(
            "accepted source {} ({} bytes, {})",
            source.name(),
            source.size_bytes(),
            source.content_type()
        );
        self.source = Some(source);
        self.output = None;
        self.region = RegionConfig::default();
        self.state = SessionState::Configuring;
        Ok(())
    }

    /// Run the removal pipeline against the current source.
    ///
    /// A previous output is discarded before the run (superseded). On
    /// success the session moves to [`SessionState::Previewing`]; on any
    /// failure it resets to idle, releasing all handles. The failure is
    /// propagated, never papered over with the unprocessed source.
    ///
    /// # Errors
    ///
    /// [`Error::Load`] if no source is loaded, plus anything the pipeline
    /// itself can fail with.
    pub fn process<E: VideoEngine + ?Sized>(
        &mut self,
        engine: &E,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<&ProcessedVideo> {
        let Some(source) = self.source.as_ref() else {
            return Err(Error::Load("no source video loaded".to_string()));
        };

        self.output = None;
        self.state = SessionState::Processing;

        let pipeline = Pipeline::new(engine, self.region.clone());
        match pipeline.run(source, observer, cancel) {
            Ok(processed) => {
                self.output = Some(processed);
                self.state = SessionState::Previewing;
                Ok(self.output.as_ref().unwrap_or_else(|| unreachable!()))
            }
            Err(e) => {
                warn!("pipeline failed, resetting session: {e}");
                self.reset();
                Err(e)
            }
        }
    }

    /// Suggested download name for the processed output:
    /// `<original-stem>_no_watermark.mp4`, with filesystem-unsafe characters
    /// in the stem replaced.
    #[must_use]
    pub fn output_filename(&self) -> Option<String> {
        self.source
            .as_ref()
            .map(|s| default_output_name(s.name()))
    }

    /// Abandon the session: release the source and output handles and
    /// restore the region config to its defaults.
    pub fn reset(&mut self) {
        self.source = None;
        self.output = None;
        self.region = RegionConfig::default();
        self.state = SessionState::Idle;
    }
}

/// Build the download name for a processed video.
///
/// Example: `"my clip.webm"` becomes `"my clip_no_watermark.mp4"`.
#[must_use]
pub fn default_output_name(source_name: &str) -> String {
    // String-level stem: uploaded names are labels, not paths, so a slash
    // must not be treated as a directory separator here.
    let stem = match source_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source_name,
    };
    format!("{}_no_watermark.mp4", sanitize_stem(stem))
}

/// Replace filesystem-unsafe characters in a file stem with underscores.
fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Check if a file has a supported video extension.
#[must_use]
pub fn is_supported_video(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(ext.to_lowercase().as_str(), "mp4" | "webm" | "mov"),
        None => false,
    }
}

/// Guess a MIME type from a file extension, for local file intake.
#[must_use]
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str())?.to_lowercase().as_str() {
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Preset;

    #[test]
    fn source_rejects_non_video_mime() {
        let result = SourceVideo::new("a.png", "image/png", vec![0]);
        assert!(matches!(
            result,
            Err(Error::UnsupportedMediaType { .. })
        ));
    }

    #[test]
    fn source_rejects_oversized_file() {
        // alloc_zeroed keeps this cheap despite the size.
        let data = vec![0u8; (MAX_SOURCE_BYTES + 1) as usize];
        let result = SourceVideo::new("big.mp4", "video/mp4", data);
        assert!(matches!(result, Err(Error::FileTooLarge { .. })));
    }

    #[test]
    fn source_accepts_video_mime_variants() {
        assert!(SourceVideo::new("a.mp4", "video/mp4", vec![0]).is_ok());
        assert!(SourceVideo::new("a.webm", "video/webm", vec![0]).is_ok());
        assert!(SourceVideo::new("a.mov", "video/quicktime", vec![0]).is_ok());
    }

    #[test]
    fn rejected_upload_leaves_session_untouched() {
        let mut session = Session::new();
        let err = session.accept_source("a.png", "image/png", vec![0]);
        assert!(err.is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.source().is_none());
    }

    #[test]
    fn accepting_source_moves_to_configuring_with_default_region() {
        let mut session = Session::new();
        session
            .accept_source("clip.mp4", "video/mp4", vec![1, 2, 3])
            .unwrap();
        assert_eq!(session.state(), SessionState::Configuring);
        assert_eq!(session.region().preset(), Preset::BottomRight);
        assert_eq!(session.source().unwrap().size_bytes(), 3);
    }

    #[test]
    fn new_source_supersedes_previous_handles() {
        let mut session = Session::new();
        session
            .accept_source("one.mp4", "video/mp4", vec![1])
            .unwrap();
        let weak = Arc::downgrade(session.source().unwrap().data_handle());
        session.region_mut().apply_preset(Preset::TopLeft);

        session
            .accept_source("two.mp4", "video/mp4", vec![2])
            .unwrap();
        assert!(weak.upgrade().is_none(), "old source handle still alive");
        assert_eq!(session.region().preset(), Preset::BottomRight);
        assert_eq!(session.source().unwrap().name(), "two.mp4");
    }

    #[test]
    fn reset_releases_handles_and_restores_defaults() {
        let mut session = Session::new();
        session
            .accept_source("clip.mp4", "video/mp4", vec![1, 2, 3])
            .unwrap();
        session.region_mut().set_x(33).unwrap();
        let weak = Arc::downgrade(session.source().unwrap().data_handle());

        session.reset();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.source().is_none());
        assert!(session.output().is_none());
        assert!(weak.upgrade().is_none(), "source handle leaked past reset");
        assert_eq!(session.region(), &RegionConfig::default());
    }

    #[test]
    fn output_name_sanitizes_unsafe_stem_characters() {
        assert_eq!(
            default_output_name("my clip.mp4"),
            "my clip_no_watermark.mp4"
        );
        assert_eq!(
            default_output_name("we/ird:na*me?.mov"),
            "we_ird_na_me__no_watermark.mp4"
        );
        assert_eq!(default_output_name("noext"), "noext_no_watermark.mp4");
    }

    #[test]
    fn supported_video_extensions() {
        assert!(is_supported_video(Path::new("a.mp4")));
        assert!(is_supported_video(Path::new("a.WEBM")));
        assert!(is_supported_video(Path::new("a.mov")));
        assert!(!is_supported_video(Path::new("a.avi")));
        assert!(!is_supported_video(Path::new("a")));
    }

    #[test]
    fn content_type_guesses_from_extension() {
        assert_eq!(content_type_for_path(Path::new("a.mp4")), Some("video/mp4"));
        assert_eq!(
            content_type_for_path(Path::new("a.MOV")),
            Some("video/quicktime")
        );
        assert_eq!(content_type_for_path(Path::new("a.avi")), None);
    }
}
