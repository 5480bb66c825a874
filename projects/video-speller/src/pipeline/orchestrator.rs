// Pipeline orchestrator: manages the spell-check run lifecycle
//
// Drives sampler -> OCR -> reconstruction -> spell check per frame, records
// evidence for frames with errors, and reports log lines, frame previews and
// progress to the initiating context through injected sinks.

use crate::config::{SamplingConfig, SpellerConfig};
use crate::dictionary::DictionaryStore;
use crate::error::{SpellerError, SpellerResult};
use crate::pipeline::finalize::{write_frame_artifacts, write_run_report};
use crate::pipeline::ocr::TextDetector;
use crate::pipeline::reader::{frame_interval, FrameSampler, VideoWindow};
use crate::pipeline::reconstruct::reconstruct;
use crate::pipeline::spelling::SpellChecker;
use crate::pipeline::types::{CancelHandle, PipelineEvent, RunState, SampledFrame};
use crate::run_artifacts::{format_clock, FrameResult, Report, RunOutcome};
use crate::run_context::RunContext;
use crate::video::VideoReader;
use crossbeam::channel::{self, Receiver};
use image::RgbImage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

/// Errors listed per frame in the log before collapsing into "... and N more".
const LOGGED_ERRORS_PER_FRAME: usize = 5;

pub type LogSink = Box<dyn Fn(&str) + Send + Sync>;
pub type PreviewSink = Box<dyn Fn(usize, &RgbImage) + Send + Sync>;
pub type ProgressSink = Box<dyn Fn(u8) + Send + Sync>;
pub type FinishedSink = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// Optional callbacks through which a run reports back. All of them are
/// invoked from the worker, in frame order.
#[derive(Default)]
pub struct EventSinks {
    pub log: Option<LogSink>,
    pub frame_preview: Option<PreviewSink>,
    pub progress: Option<ProgressSink>,
    /// Receives exactly one terminal event per started run.
    pub finished: Option<FinishedSink>,
}

impl EventSinks {
    /// Sinks that forward everything onto a bounded channel.
    ///
    /// Progress ticks and previews are dropped when the channel is full; log
    /// lines and the terminal event wait for room.
    pub fn channel(capacity: usize) -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let log_tx = tx.clone();
        let preview_tx = tx.clone();
        let progress_tx = tx.clone();

        let sinks = Self {
            log: Some(Box::new(move |line: &str| {
                let _ = log_tx.send(PipelineEvent::Log(line.to_string()));
            })),
            frame_preview: Some(Box::new(move |index, image: &RgbImage| {
                let _ = preview_tx.try_send(PipelineEvent::FramePreview {
                    index,
                    image: Arc::new(image.clone()),
                });
            })),
            progress: Some(Box::new(move |percent| {
                let _ = progress_tx.try_send(PipelineEvent::Progress(percent));
            })),
            finished: Some(Box::new(move |event| {
                let _ = tx.send(event);
            })),
        };
        (sinks, rx)
    }

    fn info(&self, line: &str) {
        tracing::info!("{}", line);
        if let Some(log) = &self.log {
            log(line);
        }
    }

    fn warn(&self, line: &str) {
        tracing::warn!("{}", line);
        if let Some(log) = &self.log {
            log(line);
        }
    }

    fn preview(&self, index: usize, image: &RgbImage) {
        if let Some(preview) = &self.frame_preview {
            preview(index, image);
        }
    }

    fn progress(&self, percent: u8) {
        if let Some(progress) = &self.progress {
            progress(percent);
        }
    }

    fn finished(&self, event: PipelineEvent) {
        if let Some(finished) = &self.finished {
            finished(event);
        }
    }
}

/// What to analyse.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub video_path: PathBuf,
    pub sampling: SamplingConfig,
}

/// Handle to a run executing on its worker thread. Cancellation goes through
/// the `CancelHandle` given to `spawn`.
pub struct RunHandle {
    worker: JoinHandle<SpellerResult<Report>>,
}

impl RunHandle {
    /// True once the worker thread has exited, whether or not it was joined.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> SpellerResult<Report> {
        self.worker
            .join()
            .map_err(|_| SpellerError::Fatal("pipeline worker panicked".to_string()))?
    }
}

/// Everything validated before the first frame is touched.
struct PreparedRun {
    reader: Box<dyn VideoReader>,
    window: VideoWindow,
    frame_interval: usize,
    expected_samples: usize,
    ctx: RunContext,
    report: Report,
}

enum LoopEnd {
    Exhausted,
    Cancelled,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Clears the active flag when a run ends, however it ends.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Emits a percentage only when it grows.
struct ProgressTracker {
    expected: usize,
    done: usize,
    last: Option<u8>,
}

impl ProgressTracker {
    fn new(expected: usize) -> Self {
        Self {
            expected: expected.max(1),
            done: 0,
            last: None,
        }
    }

    fn advance(&mut self, sinks: &EventSinks) {
        self.done += 1;
        let percent = (self.done * 100 / self.expected).min(100) as u8;
        self.emit(percent, sinks);
    }

    fn complete(&mut self, sinks: &EventSinks) {
        self.emit(100, sinks);
    }

    fn emit(&mut self, percent: u8, sinks: &EventSinks) {
        if self.last.map_or(true, |last| percent > last) {
            self.last = Some(percent);
            sinks.progress(percent);
        }
    }
}

pub struct Orchestrator {
    config: Arc<SpellerConfig>,
    dictionaries: Arc<DictionaryStore>,
    checker: SpellChecker,
    sinks: EventSinks,
    is_active: AtomicBool,
    state: RwLock<RunState>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<SpellerConfig>,
        dictionaries: Arc<DictionaryStore>,
        sinks: EventSinks,
    ) -> Self {
        let checker = SpellChecker::new(dictionaries.clone(), config.spelling.clone());
        Self {
            config,
            dictionaries,
            checker,
            sinks,
            is_active: AtomicBool::new(false),
            state: RwLock::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        self.state.read().map(|s| *s).unwrap_or(RunState::Failed)
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    /// Run on the calling thread until the window is exhausted or `cancel` fires.
    pub fn run(
        &self,
        reader: Box<dyn VideoReader>,
        detector: Box<dyn TextDetector>,
        request: &RunRequest,
        cancel: &CancelHandle,
    ) -> SpellerResult<Report> {
        self.acquire()?;
        let _guard = ActiveGuard(&self.is_active);
        let prepared = self.prepare(reader, request)?;
        self.execute(prepared, detector, cancel)
    }

    /// Validate the request here, then run on a dedicated worker thread.
    /// Input errors are returned directly and no worker is started.
    pub fn spawn(
        self: &Arc<Self>,
        reader: Box<dyn VideoReader>,
        detector: Box<dyn TextDetector>,
        request: RunRequest,
        cancel: CancelHandle,
    ) -> SpellerResult<RunHandle> {
        self.acquire()?;
        let prepared = match self.prepare(reader, &request) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.is_active.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let orchestrator = Arc::clone(self);
        let worker = thread::Builder::new()
            .name("video-speller-run".to_string())
            .spawn(move || {
                let _guard = ActiveGuard(&orchestrator.is_active);
                tracing::info!("Pipeline worker started");
                let result = orchestrator.execute(prepared, detector, &cancel);
                tracing::info!("Pipeline worker finished");
                result
            })
            .map_err(|e| {
                self.is_active.store(false, Ordering::Release);
                SpellerError::Fatal(format!("failed to start pipeline worker: {}", e))
            })?;

        Ok(RunHandle { worker })
    }

    fn acquire(&self) -> SpellerResult<()> {
        self.is_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SpellerError::AlreadyRunning)
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut current) = self.state.write() {
            *current = state;
        }
    }

    /// Resolve the window, then (and only then) prepare the output directory.
    fn prepare(
        &self,
        reader: Box<dyn VideoReader>,
        request: &RunRequest,
    ) -> SpellerResult<PreparedRun> {
        self.set_state(RunState::Idle);
        let prepared = self.try_prepare(reader, request);
        if let Err(e) = &prepared {
            tracing::error!("Run not started: {}", e);
            self.set_state(RunState::Failed);
        }
        prepared
    }

    fn try_prepare(
        &self,
        reader: Box<dyn VideoReader>,
        request: &RunRequest,
    ) -> SpellerResult<PreparedRun> {
        let open_error = |e: anyhow::Error| SpellerError::VideoOpen {
            path: request.video_path.clone(),
            reason: format!("{:#}", e),
        };
        let fps = reader.source_fps().map_err(open_error)?;
        let total_frames = reader.frame_count().map_err(open_error)?;

        let sampling = &request.sampling;
        let window = VideoWindow::resolve(
            &request.video_path,
            fps,
            total_frames,
            sampling.start_secs,
            sampling.end_secs,
        )?;
        let frame_interval = frame_interval(window.fps, sampling.interval_secs);
        let expected_samples = window.expected_samples(frame_interval);

        let ctx = RunContext::new(&self.config.output_dir);
        ctx.prepare()?;

        let report = Report {
            video_path: request.video_path.clone(),
            source_fps: window.fps,
            interval_secs: sampling.interval_secs,
            start_secs: window.start_secs(),
            end_secs: window.end_secs(),
            started_at: ctx.started_at,
            total_frames_processed: 0,
            frames_skipped: 0,
            frames_with_errors: Vec::new(),
            total_error_count: 0,
            output_dir: ctx.output_dir.clone(),
            report_file: None,
            outcome: RunOutcome::Completed,
        };

        Ok(PreparedRun {
            reader,
            window,
            frame_interval,
            expected_samples,
            ctx,
            report,
        })
    }

    fn execute(
        &self,
        prepared: PreparedRun,
        mut detector: Box<dyn TextDetector>,
        cancel: &CancelHandle,
    ) -> SpellerResult<Report> {
        let PreparedRun {
            mut reader,
            window,
            frame_interval,
            expected_samples,
            ctx,
            mut report,
        } = prepared;

        self.set_state(RunState::Sampling);
        self.announce(&window, frame_interval, expected_samples);

        let mut progress = ProgressTracker::new(expected_samples);
        // A panicking decoder or OCR backend fails the run like any fatal error.
        let frames = panic::catch_unwind(AssertUnwindSafe(|| {
            self.process_frames(
                reader.as_mut(),
                &window,
                frame_interval,
                expected_samples,
                detector.as_mut(),
                &ctx,
                &mut report,
                &mut progress,
                cancel,
            )
        }))
        .unwrap_or_else(|payload| {
            Err(SpellerError::Fatal(format!(
                "pipeline stage panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

        match frames {
            Ok(LoopEnd::Exhausted) => self.complete(&ctx, report, &mut progress),
            Ok(LoopEnd::Cancelled) => self.cancelled(&ctx, report),
            Err(e) => Err(self.fail(&ctx, report, e)),
        }
    }

    fn announce(&self, window: &VideoWindow, frame_interval: usize, expected_samples: usize) {
        if window.start_clamped {
            self.sinks.warn(&format!(
                "Requested start time exceeds video duration {}; analysing from the beginning",
                format_clock(window.total_frames as f64 / window.fps)
            ));
        }
        self.sinks.info(&format!(
            "Analysing {} - {}",
            format_clock(window.start_secs()),
            format_clock(window.end_secs())
        ));
        self.sinks.info(&format!(
            "Frames: {} - {} of {} (every {} frames, {} samples)",
            window.start_frame, window.end_frame, window.total_frames, frame_interval, expected_samples
        ));
        for missing in self.dictionaries.missing() {
            self.sinks.warn(&missing.advisory());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_frames(
        &self,
        reader: &mut dyn VideoReader,
        window: &VideoWindow,
        frame_interval: usize,
        expected_samples: usize,
        detector: &mut dyn TextDetector,
        ctx: &RunContext,
        report: &mut Report,
        progress: &mut ProgressTracker,
        cancel: &CancelHandle,
    ) -> SpellerResult<LoopEnd> {
        let mut sampler = FrameSampler::new(reader, window, frame_interval)?;
        let mut ordinal = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(LoopEnd::Cancelled);
            }
            self.set_state(RunState::Sampling);
            let Some(item) = sampler.next() else {
                return Ok(LoopEnd::Exhausted);
            };
            ordinal += 1;

            let outcome = item.and_then(|frame| {
                self.sinks.info(&format!(
                    "Processing frame {}/{} (#{})",
                    ordinal, expected_samples, frame.index
                ));
                self.process_frame(frame, window.fps, detector, ctx, report)
            });

            match outcome {
                Ok(()) => report.total_frames_processed += 1,
                Err(e) if e.is_transient() => {
                    self.sinks.warn(&format!("  Frame skipped: {}", e));
                    report.frames_skipped += 1;
                }
                Err(e) => return Err(e),
            }
            progress.advance(&self.sinks);
        }
    }

    fn process_frame(
        &self,
        frame: SampledFrame,
        fps: f64,
        detector: &mut dyn TextDetector,
        ctx: &RunContext,
        report: &mut Report,
    ) -> SpellerResult<()> {
        let SampledFrame { index, image } = frame;

        self.set_state(RunState::Detecting);
        let detections = detector.detect_text(&image).map_err(|e| SpellerError::Ocr {
            index,
            reason: format!("{:#}", e),
        })?;

        self.set_state(RunState::Reconstructing);
        let text = reconstruct(&detections, self.config.line_threshold);
        if text.is_empty() {
            self.sinks.info("  No text detected");
            self.sinks.preview(index, &image);
            return Ok(());
        }
        let full_text = text.to_text();

        self.set_state(RunState::CheckingSpelling);
        let errors = self.checker.check(&full_text);

        if errors.is_empty() {
            self.sinks.info("  No errors found");
        } else {
            self.set_state(RunState::Recording);
            self.sinks.info(&format!("  Errors found: {}", errors.len()));
            for error in errors.iter().take(LOGGED_ERRORS_PER_FRAME) {
                self.sinks.info(&format!("     - {}", error));
            }
            if errors.len() > LOGGED_ERRORS_PER_FRAME {
                self.sinks.info(&format!(
                    "     ... and {} more",
                    errors.len() - LOGGED_ERRORS_PER_FRAME
                ));
            }

            let result = FrameResult {
                frame_index: index,
                timecode_secs: index as f64 / fps,
                errors,
                full_text,
            };
            write_frame_artifacts(ctx, &result, &image)?;
            self.sinks.info(&format!(
                "  Saved: {}",
                ctx.evidence_image_path(index).display()
            ));
            report.record(result);
        }

        self.sinks.preview(index, &image);
        Ok(())
    }

    fn complete(
        &self,
        ctx: &RunContext,
        mut report: Report,
        progress: &mut ProgressTracker,
    ) -> SpellerResult<Report> {
        self.set_state(RunState::Aggregating);
        report.outcome = RunOutcome::Completed;
        if let Err(e) = write_run_report(ctx, &mut report) {
            return Err(self.fail(ctx, report, e));
        }

        progress.complete(&self.sinks);
        self.log_summary(&report);
        self.set_state(RunState::Done);
        self.sinks.finished(PipelineEvent::Completed(report.clone()));
        Ok(report)
    }

    fn cancelled(&self, ctx: &RunContext, mut report: Report) -> SpellerResult<Report> {
        self.sinks.warn("Processing cancelled; saving partial results");
        self.set_state(RunState::Aggregating);
        report.outcome = RunOutcome::Cancelled;
        if let Err(e) = write_run_report(ctx, &mut report) {
            return Err(self.fail(ctx, report, e));
        }

        self.log_summary(&report);
        self.set_state(RunState::Cancelled);
        self.sinks.finished(PipelineEvent::Cancelled(report.clone()));
        Ok(report)
    }

    /// Flush whatever has accumulated, then report the failure.
    fn fail(&self, ctx: &RunContext, mut report: Report, error: SpellerError) -> SpellerError {
        tracing::error!("Pipeline failed: {}", error);
        if let Some(log) = &self.sinks.log {
            log(&format!("Processing failed: {}", error));
        }

        report.outcome = RunOutcome::Failed {
            message: error.to_string(),
        };
        if let Err(flush_error) = write_run_report(ctx, &mut report) {
            report.report_file = None;
            tracing::warn!("Could not save partial report: {}", flush_error);
        }

        self.set_state(RunState::Failed);
        self.sinks.finished(PipelineEvent::Failed {
            message: error.to_string(),
            class: error.class(),
            partial: Some(report),
        });
        error
    }

    fn log_summary(&self, report: &Report) {
        self.sinks.info(&format!(
            "Frames processed: {}, frames with errors: {}, total errors: {}",
            report.total_frames_processed,
            report.frames_with_errors_count(),
            report.total_error_count
        ));
        if report.frames_skipped > 0 {
            self.sinks
                .info(&format!("Frames skipped: {}", report.frames_skipped));
        }
        if let Some(path) = &report.report_file {
            self.sinks.info(&format!("Report saved: {}", path.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpellingPolicy;
    use crate::dictionary::Whitelist;
    use crate::pipeline::types::Detection;
    use crate::testing::{ScriptedDetector, SyntheticVideo, WordListLexicon};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        logs: Mutex<Vec<String>>,
        previews: Mutex<Vec<usize>>,
        progress: Mutex<Vec<u8>>,
        finished: Mutex<Vec<PipelineEvent>>,
    }

    fn recording_sinks(recorded: &Arc<Recorded>) -> EventSinks {
        let (r1, r2, r3, r4) = (
            recorded.clone(),
            recorded.clone(),
            recorded.clone(),
            recorded.clone(),
        );
        EventSinks {
            log: Some(Box::new(move |line: &str| r1.logs.lock().unwrap().push(line.to_string()))),
            frame_preview: Some(Box::new(move |index, _: &RgbImage| r2.previews.lock().unwrap().push(index))),
            progress: Some(Box::new(move |p| r3.progress.lock().unwrap().push(p))),
            finished: Some(Box::new(move |e| r4.finished.lock().unwrap().push(e))),
        }
    }

    fn russian() -> WordListLexicon {
        WordListLexicon::new(["привет", "мир", "ошибка", "текст"])
            .with_suggestions("ошыбка", ["ошибка"])
    }

    fn english() -> WordListLexicon {
        WordListLexicon::new(["hello", "world", "the"]).with_suggestions("wrld", ["world"])
    }

    fn store(english_loaded: bool) -> Arc<DictionaryStore> {
        let english: Option<Box<dyn crate::dictionary::Lexicon>> = if english_loaded {
            Some(Box::new(english()))
        } else {
            None
        };
        Arc::new(DictionaryStore::from_parts(
            Some(Box::new(russian())),
            english,
            Whitelist::default(),
        ))
    }

    fn config(output_dir: &Path) -> Arc<SpellerConfig> {
        Arc::new(SpellerConfig {
            output_dir: output_dir.to_path_buf(),
            spelling: SpellingPolicy::default(),
            ..SpellerConfig::default()
        })
    }

    fn request(interval_secs: f64) -> RunRequest {
        RunRequest {
            video_path: PathBuf::from("synthetic.mp4"),
            sampling: SamplingConfig {
                interval_secs,
                start_secs: 0.0,
                end_secs: None,
            },
        }
    }

    fn detector() -> ScriptedDetector {
        ScriptedDetector::new()
            .with_line(0, 10.0, "Привет мир")
            .with_line(20, 10.0, "hello wrld")
            .with_line(20, 60.0, "ошыбка текст")
            .with_line(60, 10.0, "the world")
    }

    #[test]
    fn test_end_to_end_run_samples_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = Arc::new(Recorded::default());
        let orchestrator = Orchestrator::new(config(dir.path()), store(true), recording_sinks(&recorded));

        let report = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector()),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap();

        assert_eq!(*recorded.previews.lock().unwrap(), vec![0, 20, 40, 60, 80]);
        assert_eq!(report.total_frames_processed, 5);
        assert_eq!(report.frames_with_errors_count(), 1);
        assert_eq!(report.total_error_count, 2);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.source_fps, 10.0);

        let frame = &report.frames_with_errors[0];
        assert_eq!(frame.frame_index, 20);
        assert_eq!(frame.timecode_secs, 2.0);
        assert_eq!(frame.full_text, "hello wrld\nошыбка текст");
        let words: Vec<_> = frame.errors.iter().map(|e| e.word.as_str()).collect();
        assert_eq!(words, vec!["wrld", "ошыбка"]);

        assert!(dir.path().join("frame_20_errors.png").is_file());
        assert!(dir.path().join("frame_20_errors.txt").is_file());
        assert!(!dir.path().join("frame_0_errors.txt").exists());
        assert!(report.report_file.as_ref().unwrap().is_file());

        let progress = recorded.progress.lock().unwrap().clone();
        assert_eq!(progress, vec![20, 40, 60, 80, 100]);
        assert_eq!(orchestrator.state(), RunState::Done);
        assert!(!orchestrator.is_active());

        let finished = recorded.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert!(matches!(finished[0], PipelineEvent::Completed(_)));
    }

    #[test]
    fn test_missing_english_lexicon_advises_once() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = Arc::new(Recorded::default());
        let orchestrator = Orchestrator::new(config(dir.path()), store(false), recording_sinks(&recorded));

        let report = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector()),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap();

        let words: Vec<_> = report
            .frames_with_errors
            .iter()
            .flat_map(|f| f.errors.iter().map(|e| e.word.clone()))
            .collect();
        assert_eq!(words, vec!["ошыбка"]);

        let logs = recorded.logs.lock().unwrap();
        let advisories = logs
            .iter()
            .filter(|l| l.contains("English dictionary unavailable"))
            .count();
        assert_eq!(advisories, 1);
        assert!(!logs.iter().any(|l| l.contains("Russian dictionary unavailable")));
    }

    #[test]
    fn test_frame_without_detections_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(config(dir.path()), store(true), EventSinks::default());

        let report = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 40)),
                Box::new(ScriptedDetector::new()),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap();

        assert_eq!(report.total_frames_processed, 2);
        assert!(report.frames_with_errors.is_empty());
        assert_eq!(report.total_error_count, 0);

        // Only the aggregate report trio is written.
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.starts_with("report-")));
    }

    #[test]
    fn test_ocr_failure_skips_frame_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = Arc::new(Recorded::default());
        let orchestrator = Orchestrator::new(config(dir.path()), store(true), recording_sinks(&recorded));

        let report = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector().failing_on(20)),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap();

        assert_eq!(report.total_frames_processed, 4);
        assert_eq!(report.frames_skipped, 1);
        assert!(report.frames_with_errors.is_empty());
        assert_eq!(*recorded.previews.lock().unwrap(), vec![0, 40, 60, 80]);
        assert_eq!(*recorded.progress.lock().unwrap().last().unwrap(), 100);
        assert!(recorded
            .logs
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.contains("Frame skipped") && l.contains("frame 20")));
    }

    #[test]
    fn test_stale_frame_artifacts_removed_reports_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("frame_999_errors.png"), "old").unwrap();
        fs::write(dir.path().join("frame_999_errors.txt"), "old").unwrap();
        fs::write(dir.path().join("report-20200101-000000.txt"), "old").unwrap();

        let orchestrator = Orchestrator::new(config(dir.path()), store(true), EventSinks::default());
        orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector()),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap();

        assert!(!dir.path().join("frame_999_errors.png").exists());
        assert!(!dir.path().join("frame_999_errors.txt").exists());
        assert!(dir.path().join("report-20200101-000000.txt").exists());
        assert!(dir.path().join("frame_20_errors.png").exists());
    }

    #[test]
    fn test_cancellation_between_frames_keeps_partial_report() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelHandle::new();
        let recorded = Arc::new(Recorded::default());
        let mut sinks = recording_sinks(&recorded);
        let trigger = cancel.clone();
        let previews = recorded.clone();
        sinks.frame_preview = Some(Box::new(move |index, _: &RgbImage| {
            previews.previews.lock().unwrap().push(index);
            if index == 20 {
                trigger.cancel();
            }
        }));
        let orchestrator = Orchestrator::new(config(dir.path()), store(true), sinks);

        let report = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector()),
                &request(2.0),
                &cancel,
            )
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.total_frames_processed, 2);
        assert_eq!(report.frames_with_errors_count(), 1);
        assert_eq!(*recorded.previews.lock().unwrap(), vec![0, 20]);
        assert_eq!(orchestrator.state(), RunState::Cancelled);

        let text = fs::read_to_string(report.report_file.as_ref().unwrap()).unwrap();
        assert!(text.contains("Status: cancelled"));
        assert!(matches!(
            recorded.finished.lock().unwrap()[0],
            PipelineEvent::Cancelled(_)
        ));
    }

    #[test]
    fn test_invalid_range_fails_before_touching_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never-created");
        let recorded = Arc::new(Recorded::default());
        let orchestrator = Orchestrator::new(config(&out), store(true), recording_sinks(&recorded));

        let mut req = request(2.0);
        req.sampling.start_secs = 5.0;
        req.sampling.end_secs = Some(3.0);
        let err = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector()),
                &req,
                &CancelHandle::new(),
            )
            .unwrap_err();

        assert!(matches!(err, SpellerError::InvalidRange(_)));
        assert!(!out.exists());
        assert!(recorded.finished.lock().unwrap().is_empty());
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(!orchestrator.is_active());
    }

    #[test]
    fn test_broken_decoder_fails_and_flushes_partial_report() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = Arc::new(Recorded::default());
        let orchestrator = Orchestrator::new(config(dir.path()), store(true), recording_sinks(&recorded));
        let broken: Vec<usize> = (30..100).collect();

        let err = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 100).with_broken_frames(&broken)),
                Box::new(detector()),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(orchestrator.state(), RunState::Failed);

        let finished = recorded.finished.lock().unwrap();
        match &finished[0] {
            PipelineEvent::Failed { partial, .. } => {
                let partial = partial.as_ref().unwrap();
                assert_eq!(partial.total_frames_processed, 2);
                assert_eq!(partial.frames_with_errors_count(), 1);
                let text = fs::read_to_string(partial.report_file.as_ref().unwrap()).unwrap();
                assert!(text.contains("Status: failed"));
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
    }

    /// Blocks on every frame until the test lets it through.
    struct GatedDetector {
        gate: channel::Receiver<()>,
        inner: ScriptedDetector,
    }

    impl TextDetector for GatedDetector {
        fn detect_text(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            let _ = self.gate.recv();
            self.inner.detect_text(image)
        }
    }

    #[test]
    fn test_second_run_while_active_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            config(dir.path()),
            store(true),
            EventSinks::default(),
        ));
        let (gate_tx, gate_rx) = channel::unbounded();

        let handle = orchestrator
            .spawn(
                Box::new(SyntheticVideo::new(10.0, 40)),
                Box::new(GatedDetector {
                    gate: gate_rx,
                    inner: detector(),
                }),
                request(2.0),
                CancelHandle::new(),
            )
            .unwrap();
        assert!(orchestrator.is_active());

        let err = orchestrator
            .run(
                Box::new(SyntheticVideo::new(10.0, 40)),
                Box::new(detector()),
                &request(2.0),
                &CancelHandle::new(),
            )
            .unwrap_err();
        assert!(matches!(err, SpellerError::AlreadyRunning));

        drop(gate_tx);
        let report = handle.join().unwrap();
        assert_eq!(report.total_frames_processed, 2);
        assert!(!orchestrator.is_active());
    }

    #[test]
    fn test_spawned_run_streams_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (sinks, events) = EventSinks::channel(1024);
        let orchestrator = Arc::new(Orchestrator::new(config(dir.path()), store(true), sinks));

        let handle = orchestrator
            .spawn(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(detector()),
                request(2.0),
                CancelHandle::new(),
            )
            .unwrap();

        let mut previews = Vec::new();
        let mut progress = Vec::new();
        let mut terminal = None;
        for event in events.iter() {
            match event {
                PipelineEvent::FramePreview { index, .. } => previews.push(index),
                PipelineEvent::Progress(p) => progress.push(p),
                PipelineEvent::Log(_) => {}
                other => {
                    terminal = Some(other);
                    break;
                }
            }
        }

        assert_eq!(previews, vec![0, 20, 40, 60, 80]);
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.last(), Some(&100));
        match terminal {
            Some(PipelineEvent::Completed(report)) => assert_eq!(report.total_error_count, 2),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert_eq!(handle.join().unwrap().total_frames_processed, 5);
    }

    #[test]
    fn test_spawn_surfaces_input_errors_directly() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            config(dir.path()),
            store(true),
            EventSinks::default(),
        ));
        let err = orchestrator
            .spawn(
                Box::new(SyntheticVideo::new(0.0, 100)),
                Box::new(detector()),
                request(2.0),
                CancelHandle::new(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, SpellerError::InvalidFps(_)));
        assert!(!orchestrator.is_active());
    }

    struct PanickingDetector {
        panic_on: usize,
        inner: ScriptedDetector,
    }

    impl TextDetector for PanickingDetector {
        fn detect_text(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            if crate::testing::frame_tag(image) == self.panic_on {
                panic!("backend crashed");
            }
            self.inner.detect_text(image)
        }
    }

    #[test]
    fn test_backend_panic_fails_run_and_delivers_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        let (sinks, events) = EventSinks::channel(64);
        let orchestrator = Arc::new(Orchestrator::new(config(dir.path()), store(true), sinks));

        let handle = orchestrator
            .spawn(
                Box::new(SyntheticVideo::new(10.0, 100)),
                Box::new(PanickingDetector {
                    panic_on: 40,
                    inner: detector(),
                }),
                request(2.0),
                CancelHandle::new(),
            )
            .unwrap();

        let terminal = loop {
            let event = events
                .recv_timeout(std::time::Duration::from_secs(10))
                .expect("terminal event");
            if event.is_terminal() {
                break event;
            }
        };

        match terminal {
            PipelineEvent::Failed {
                message,
                class,
                partial,
            } => {
                assert!(message.contains("backend crashed"));
                assert_eq!(class, crate::error::ErrorClass::Fatal);
                let partial = partial.unwrap();
                assert_eq!(partial.total_frames_processed, 2);
                assert_eq!(partial.frames_with_errors_count(), 1);
                let text = fs::read_to_string(partial.report_file.as_ref().unwrap()).unwrap();
                assert!(text.contains("Status: failed"));
            }
            other => panic!("unexpected terminal event {:?}", other),
        }

        let err = handle.join().unwrap_err();
        assert!(matches!(err, SpellerError::Fatal(_)));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(!orchestrator.is_active());
    }
}
