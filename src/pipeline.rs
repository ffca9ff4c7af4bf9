//! The four-stage processing pipeline.
//!
//! Stages run strictly in order: Loading, Analyzing, Removing, Finalizing.
//! No stage is skipped or reordered, and a completed stage is never
//! re-entered. Each stage reports a percentage and a status string to a
//! [`ProgressObserver`]; while the engine runs, its own progress is forwarded
//! as intermediate reports between 40% and 95%. The reports are purely
//! observational and have no control effect. A failure in any stage
//! propagates as an error, leaving no processed artifact behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::engine::VideoEngine;
use crate::error::{Error, Result};
use crate::region::RegionConfig;
use crate::session::{ProcessedVideo, SourceVideo};

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Accept and validate the source binary.
    Loading,
    /// One-time engine initialization and native dimension probe. No
    /// watermark detection happens here; the region comes from the config.
    Analyzing,
    /// Submit the source plus filter spec to the engine.
    Removing,
    /// Wrap the engine output as the processed artifact.
    Finalizing,
}

impl Stage {
    /// The progress percentage reported on entering this stage.
    #[must_use]
    pub fn percent(self) -> u8 {
        match self {
            Stage::Loading => 10,
            Stage::Analyzing => 25,
            Stage::Removing => 40,
            Stage::Finalizing => 95,
        }
    }

    /// Human-readable status for this stage.
    #[must_use]
    pub fn status(self) -> &'static str {
        match self {
            Stage::Loading => "Loading video file...",
            Stage::Analyzing => "Analyzing watermark region...",
            Stage::Removing => "Removing watermark...",
            Stage::Finalizing => "Finalizing video...",
        }
    }
}

/// Observer for pipeline progress. Both methods default to no-ops.
pub trait ProgressObserver {
    /// Called once when a stage is entered.
    fn on_stage(&mut self, stage: Stage) {
        let _ = stage;
    }

    /// Called with a progress percentage and status string.
    fn on_progress(&mut self, percent: u8, status: &str) {
        let _ = (percent, status);
    }
}

/// An observer that ignores all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

/// Coarse-grained cancellation signal, checked only between stages.
///
/// Cancellation after [`Stage::Removing`] has started is best-effort: the
/// in-flight engine invocation is not stopped early, and its result is
/// discarded once it completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The four-stage removal pipeline, parameterized over the engine capability.
pub struct Pipeline<'a, E: VideoEngine + ?Sized> {
    engine: &'a E,
    region: RegionConfig,
}

impl<'a, E: VideoEngine + ?Sized> Pipeline<'a, E> {
    /// Build a pipeline from an engine and a region config.
    pub fn new(engine: &'a E, region: RegionConfig) -> Self {
        Self { engine, region }
    }

    /// Run all four stages against a source video.
    ///
    /// On success returns the processed artifact. On failure the error
    /// propagates and no artifact is produced; in particular, an engine
    /// failure never degrades to returning the unprocessed input.
    ///
    /// # Errors
    ///
    /// [`Error::Load`] for an unreadable source, [`Error::EngineInit`] or
    /// [`Error::EngineFailed`] from the engine, [`Error::Cancelled`] if the
    /// token fired between stages.
    pub fn run(
        &self,
        source: &SourceVideo,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<ProcessedVideo> {
        cancel.check()?;
        self.enter(Stage::Loading, observer);
        if source.data().is_empty() {
            return Err(Error::Load(format!("{} is empty", source.name())));
        }
        debug!("loaded {} ({} bytes)", source.name(), source.size_bytes());

        cancel.check()?;
        self.enter(Stage::Analyzing, observer);
        self.engine.initialize()?;
        let dims = self.engine.probe_dimensions(source.data())?;
        let spec = self.region.to_filter_spec(dims.width, dims.height);
        debug!(
            "native {}x{}, removal region {}x{} at ({}, {})",
            dims.width, dims.height, spec.width, spec.height, spec.x, spec.y
        );

        cancel.check()?;
        self.enter(Stage::Removing, observer);
        let mut forward = |fraction: f32| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let percent = (40.0 + fraction.clamp(0.0, 1.0) * 55.0) as u8;
            observer.on_progress(percent, "Processing video frames...");
        };
        let output = self
            .engine
            .remove_region(source.data(), &spec, &mut forward)?;

        // Best-effort: the engine invocation above was not interrupted, but
        // its result is discarded if cancellation arrived meanwhile.
        if cancel.is_cancelled() {
            warn!("cancelled after removal completed, discarding result");
            return Err(Error::Cancelled);
        }

        self.enter(Stage::Finalizing, observer);
        let processed = ProcessedVideo::new(output);
        observer.on_progress(100, "Complete!");
        info!(
            "processed {} -> {} bytes",
            source.name(),
            processed.size_bytes()
        );
        Ok(processed)
    }

    fn enter(&self, stage: Stage, observer: &mut dyn ProgressObserver) {
        observer.on_stage(stage);
        observer.on_progress(stage.percent(), stage.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FrameDimensions;
    use crate::region::FilterSpec;
    use std::sync::Mutex;

    /// Records every stage entry and progress report.
    #[derive(Default)]
    struct RecordingObserver {
        stages: Vec<Stage>,
        percents: Vec<u8>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_stage(&mut self, stage: Stage) {
            self.stages.push(stage);
        }

        fn on_progress(&mut self, percent: u8, _status: &str) {
            self.percents.push(percent);
        }
    }

    struct MockEngine {
        fail_removal: bool,
        /// Fractions reported through the progress callback during removal.
        emit: Vec<f32>,
        /// Fired just before removal returns, simulating a cancel request
        /// that arrives while the engine is busy.
        cancel_mid_run: Option<CancelToken>,
        specs_seen: Mutex<Vec<FilterSpec>>,
    }

    impl MockEngine {
        fn new(fail_removal: bool) -> Self {
            Self {
                fail_removal,
                emit: Vec::new(),
                cancel_mid_run: None,
                specs_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl VideoEngine for MockEngine {
        fn initialize(&self) -> Result<()> {
            Ok(())
        }

        fn probe_dimensions(&self, _input: &[u8]) -> Result<FrameDimensions> {
            Ok(FrameDimensions {
                width: 1280,
                height: 720,
            })
        }

        fn remove_region(
            &self,
            input: &[u8],
            spec: &FilterSpec,
            on_progress: &mut dyn FnMut(f32),
        ) -> Result<Vec<u8>> {
            self.specs_seen.lock().unwrap().push(*spec);
            if self.fail_removal {
                return Err(Error::EngineFailed {
                    message: "mock failure".to_string(),
                    stderr: None,
                });
            }
            for &fraction in &self.emit {
                on_progress(fraction);
            }
            if let Some(token) = &self.cancel_mid_run {
                token.cancel();
            }
            let mut out = input.to_vec();
            out.extend_from_slice(b"-processed");
            Ok(out)
        }
    }

    fn source() -> SourceVideo {
        SourceVideo::new("clip.mp4", "video/mp4", vec![1, 2, 3, 4]).unwrap()
    }

    #[test]
    fn stages_run_in_order_exactly_once() {
        let engine = MockEngine::new(false);
        let pipeline = Pipeline::new(&engine, RegionConfig::default());
        let mut observer = RecordingObserver::default();

        pipeline
            .run(&source(), &mut observer, &CancelToken::new())
            .unwrap();

        assert_eq!(
            observer.stages,
            vec![
                Stage::Loading,
                Stage::Analyzing,
                Stage::Removing,
                Stage::Finalizing
            ]
        );
        assert_eq!(observer.percents, vec![10, 25, 40, 95, 100]);
    }

    #[test]
    fn engine_progress_maps_into_removal_band() {
        let mut engine = MockEngine::new(false);
        engine.emit = vec![0.0, 0.5, 1.0];
        let pipeline = Pipeline::new(&engine, RegionConfig::default());
        let mut observer = RecordingObserver::default();

        pipeline
            .run(&source(), &mut observer, &CancelToken::new())
            .unwrap();

        // Stage entries at 10/25/40, then the engine's own fractions mapped
        // to 40..95, then Finalizing at 95 and the terminal 100.
        assert_eq!(observer.percents, vec![10, 25, 40, 40, 67, 95, 95, 100]);
    }

    #[test]
    fn out_of_range_engine_progress_is_clamped() {
        let mut engine = MockEngine::new(false);
        engine.emit = vec![-0.25, 1.75];
        let pipeline = Pipeline::new(&engine, RegionConfig::default());
        let mut observer = RecordingObserver::default();

        pipeline
            .run(&source(), &mut observer, &CancelToken::new())
            .unwrap();

        assert_eq!(observer.percents, vec![10, 25, 40, 40, 95, 95, 100]);
    }

    #[test]
    fn cancellation_during_removal_discards_completed_result() {
        let cancel = CancelToken::new();
        let mut engine = MockEngine::new(false);
        engine.cancel_mid_run = Some(cancel.clone());
        let pipeline = Pipeline::new(&engine, RegionConfig::default());
        let mut observer = RecordingObserver::default();

        let result = pipeline.run(&source(), &mut observer, &cancel);

        assert!(matches!(result, Err(Error::Cancelled)));
        // The engine ran to completion exactly once, but its result was
        // discarded and Finalizing was never entered.
        assert_eq!(engine.specs_seen.lock().unwrap().len(), 1);
        assert_eq!(
            observer.stages,
            vec![Stage::Loading, Stage::Analyzing, Stage::Removing]
        );
    }

    #[test]
    fn filter_spec_uses_native_dimensions() {
        let engine = MockEngine::new(false);
        let region = RegionConfig::new(50, 50, 200, 60).unwrap();
        let pipeline = Pipeline::new(&engine, region);

        pipeline
            .run(&source(), &mut NullObserver, &CancelToken::new())
            .unwrap();

        let specs = engine.specs_seen.lock().unwrap();
        assert_eq!(specs.len(), 1);
        // 50% of the probed 1280x720, dimensions untouched.
        assert_eq!(specs[0].x, 640);
        assert_eq!(specs[0].y, 360);
        assert_eq!(specs[0].width, 200);
        assert_eq!(specs[0].height, 60);
    }

    #[test]
    fn engine_failure_propagates_without_artifact() {
        let engine = MockEngine::new(true);
        let pipeline = Pipeline::new(&engine, RegionConfig::default());

        let result = pipeline.run(&source(), &mut NullObserver, &CancelToken::new());
        assert!(matches!(result, Err(Error::EngineFailed { .. })));
    }

    #[test]
    fn empty_source_fails_loading() {
        let engine = MockEngine::new(false);
        let pipeline = Pipeline::new(&engine, RegionConfig::default());
        let empty = SourceVideo::new("empty.mp4", "video/mp4", Vec::new()).unwrap();

        let result = pipeline.run(&empty, &mut NullObserver, &CancelToken::new());
        assert!(matches!(result, Err(Error::Load(_))));
    }

    #[test]
    fn pre_cancelled_token_stops_before_loading() {
        let engine = MockEngine::new(false);
        let pipeline = Pipeline::new(&engine, RegionConfig::default());
        let mut observer = RecordingObserver::default();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = pipeline.run(&source(), &mut observer, &cancel);

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(observer.stages.is_empty());
        // Engine was never invoked.
        assert!(engine.specs_seen.lock().unwrap().is_empty());
    }
}
