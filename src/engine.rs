//! External video-processing engine boundary.
//!
//! The pipeline treats the engine as a black box: bytes in, filter spec in,
//! bytes out. [`VideoEngine`] is the injectable seam; [`FfmpegEngine`] is the
//! production implementation, spawning `ffmpeg`/`ffprobe` subprocesses with
//! temp-file I/O. One invocation spawns one isolated process, so a single
//! engine value never has two concurrent in-flight runs of its own making;
//! serializing runs is the session's job.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::region::FilterSpec;

/// Native width and height of a video stream, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDimensions {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

/// Re-encode parameters passed alongside the filter spec.
#[derive(Debug, Clone)]
pub struct EncodingSettings {
    /// Video codec name.
    pub codec: String,
    /// Encoder speed preset.
    pub preset: String,
    /// Constant rate factor (quality).
    pub crf: u8,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            crf: 23,
        }
    }
}

/// The external engine capability the pipeline depends on.
///
/// Implementations must be safe to share across pipeline runs, but a single
/// instance is not required to support two concurrent removal invocations;
/// callers either serialize runs or use one instance per run.
pub trait VideoEngine {
    /// One-time readiness check. Idempotent and memoized; may be called
    /// speculatively before any source is submitted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineInit`] if the engine is unavailable.
    fn initialize(&self) -> Result<()>;

    /// Probe the native frame dimensions of a video.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineFailed`] if the input cannot be probed.
    fn probe_dimensions(&self, input: &[u8]) -> Result<FrameDimensions>;

    /// Blank the given rectangle on every frame, re-encoding video and
    /// passing audio through unmodified. Returns the processed bytes.
    ///
    /// Execution progress is reported through `on_progress` as a fraction in
    /// `[0, 1]`, best-effort: an engine that cannot measure progress may not
    /// call it at all. The reports are observational only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineFailed`] if the invocation fails. Callers must
    /// propagate the failure; substituting the unprocessed input as output
    /// is not an acceptable fallback.
    fn remove_region(
        &self,
        input: &[u8],
        spec: &FilterSpec,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>>;
}

/// Subprocess-based engine backed by `ffmpeg` and `ffprobe`.
pub struct FfmpegEngine {
    ffmpeg_path: String,
    ffprobe_path: String,
    encoding: EncodingSettings,
    ready: OnceLock<std::result::Result<(), String>>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe", EncodingSettings::default())
            .unwrap_or_else(|_| unreachable!("default binary names are valid"))
    }
}

impl FfmpegEngine {
    /// Create an engine using the given binary paths and encode settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineInit`] if either path contains shell
    /// metacharacters.
    pub fn new(
        ffmpeg_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
        encoding: EncodingSettings,
    ) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = ffprobe_path.into();
        validate_binary_path(&ffmpeg_path)?;
        validate_binary_path(&ffprobe_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            encoding,
            ready: OnceLock::new(),
        })
    }

    fn write_temp_input(&self, input: &[u8]) -> Result<tempfile::NamedTempFile> {
        // ffmpeg sniffs the container from content, but a .mp4 suffix keeps
        // format guessing off the table for the common case.
        let file = tempfile::Builder::new().suffix(".mp4").tempfile()?;
        std::fs::write(file.path(), input)?;
        Ok(file)
    }

    /// Probe the source duration for progress reporting. Best-effort: a
    /// probe failure only costs the intermediate progress reports.
    fn probe_duration_us(&self, input_path: &Path) -> Option<u64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(input_path)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let seconds: f64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let micros = (seconds * 1_000_000.0) as u64;
        Some(micros)
    }

    fn run_ffmpeg(
        &self,
        input_path: &Path,
        output_path: &Path,
        filter: &str,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<()> {
        debug!("invoking {} with filter {filter}", self.ffmpeg_path);
        let duration_us = self.probe_duration_us(input_path);

        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-nostats",
                "-progress",
                "pipe:1",
                "-i",
            ])
            .arg(input_path)
            .args(["-vf", filter, "-c:v", &self.encoding.codec])
            .args(["-preset", &self.encoding.preset])
            .args(["-crf", &self.encoding.crf.to_string()])
            .args(["-c:a", "copy"])
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::EngineFailed {
                message: format!("failed to spawn {}: {e}", self.ffmpeg_path),
                stderr: None,
            })?;

        // ffmpeg writes key=value progress records to stdout; forward the
        // elapsed output time against the probed duration.
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if let (Some(done_us), Some(total_us)) =
                    (parse_out_time_us(&line), duration_us)
                {
                    #[allow(clippy::cast_precision_loss)]
                    on_progress((done_us as f32 / total_us as f32).clamp(0.0, 1.0));
                }
            }
        }

        let output = child.wait_with_output().map_err(|e| Error::EngineFailed {
            message: format!("failed to wait for {}: {e}", self.ffmpeg_path),
            stderr: None,
        })?;

        if !output.status.success() {
            return Err(Error::EngineFailed {
                message: format!("region removal failed (filter: {filter})"),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            });
        }
        Ok(())
    }
}

impl VideoEngine for FfmpegEngine {
    fn initialize(&self) -> Result<()> {
        let ready = self.ready.get_or_init(|| {
            let status = Command::new(&self.ffmpeg_path)
                .args(["-version"])
                .output();
            match status {
                Ok(out) if out.status.success() => {
                    info!("{} available", self.ffmpeg_path);
                    Ok(())
                }
                Ok(out) => Err(format!(
                    "{} -version exited with {}",
                    self.ffmpeg_path, out.status
                )),
                Err(e) => Err(format!("{} not runnable: {e}", self.ffmpeg_path)),
            }
        });
        ready.clone().map_err(Error::EngineInit)
    }

    fn probe_dimensions(&self, input: &[u8]) -> Result<FrameDimensions> {
        let temp = self.write_temp_input(input)?;
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
            ])
            .arg(temp.path())
            .output()
            .map_err(|e| Error::EngineFailed {
                message: format!("failed to spawn {}: {e}", self.ffprobe_path),
                stderr: None,
            })?;

        if !output.status.success() {
            return Err(Error::EngineFailed {
                message: "dimension probe failed".to_string(),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            });
        }

        parse_dimensions(&String::from_utf8_lossy(&output.stdout))
    }

    fn remove_region(
        &self,
        input: &[u8],
        spec: &FilterSpec,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>> {
        self.initialize()?;

        let input_file = self.write_temp_input(input)?;
        let output_file = tempfile::Builder::new().suffix(".mp4").tempfile()?;

        self.run_ffmpeg(
            input_file.path(),
            output_file.path(),
            &spec.to_filter_string(),
            on_progress,
        )?;

        let data = std::fs::read(output_file.path())?;
        if data.is_empty() {
            return Err(Error::EngineFailed {
                message: "engine produced empty output".to_string(),
                stderr: None,
            });
        }
        Ok(data)
    }
}

/// Parse one ffmpeg progress record line into elapsed output time.
///
/// Both `out_time_us` and `out_time_ms` carry microseconds (the `_ms` name
/// is historical). Lines before the first frame can carry negative
/// sentinels, which fail the unsigned parse and are skipped.
fn parse_out_time_us(line: &str) -> Option<u64> {
    let value = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))?;
    value.trim().parse().ok()
}

/// Parse ffprobe's `WIDTHxHEIGHT` csv line.
fn parse_dimensions(raw: &str) -> Result<FrameDimensions> {
    let line = raw.lines().next().unwrap_or("").trim();
    let parsed = line.split_once('x').and_then(|(w, h)| {
        let width = w.trim().parse::<u32>().ok()?;
        let height = h.trim().parse::<u32>().ok()?;
        (width > 0 && height > 0).then_some(FrameDimensions { width, height })
    });
    parsed.ok_or_else(|| Error::EngineFailed {
        message: format!("unparseable dimension probe output: {line:?}"),
        stderr: None,
    })
}

/// Reject binary paths containing shell metacharacters.
fn validate_binary_path(path: &str) -> Result<()> {
    const DANGEROUS: [char; 11] = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.is_empty() || path.chars().any(|c| DANGEROUS.contains(&c)) {
        return Err(Error::EngineInit(format!(
            "invalid engine binary path: {path:?}"
        )));
    }
    Ok(())
}
