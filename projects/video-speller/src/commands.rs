use crate::cli::{Args, CheckArgs, Command};
use crate::config::SpellerConfig;
use crate::dictionary::{dictionary_status, DictionaryStore, Whitelist};
use crate::error::SpellerError;
use crate::pipeline::ocr::OcrsDetector;
use crate::pipeline::orchestrator::{EventSinks, Orchestrator, RunRequest};
use crate::pipeline::types::{CancelHandle, PipelineEvent};
use crate::run_artifacts::{format_clock, Report};
use crate::video::open_reader;
use anyhow::Result;
use crossbeam::channel::RecvTimeoutError;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EVENT_POLL: Duration = Duration::from_millis(200);

pub fn dispatch(args: Args) -> Result<()> {
    let config = args.speller_config();
    match &args.command {
        Command::Check(check) => run_check(config, check),
        Command::Info { video } => info(&config, video),
        Command::Dictionaries => dictionaries(&config),
    }
}

fn run_check(config: SpellerConfig, check: &CheckArgs) -> Result<()> {
    let config = Arc::new(config);

    let reader = open_reader(&check.video, config.backend).map_err(|e| SpellerError::VideoOpen {
        path: check.video.clone(),
        reason: format!("{:#}", e),
    })?;
    let detector = OcrsDetector::new(&config.model_dir)
        .map_err(|e| SpellerError::OcrInit(format!("{:#}", e)))?;
    let dictionaries = Arc::new(DictionaryStore::load(&config)?);

    let cancel = CancelHandle::new();
    let (mut sinks, events) = EventSinks::channel(config.event_capacity);
    if let Some(max_frames) = check.max_frames {
        stop_after(&mut sinks, max_frames, cancel.clone());
    }

    let orchestrator = Arc::new(Orchestrator::new(config.clone(), dictionaries, sinks));
    let request = RunRequest {
        video_path: check.video.clone(),
        sampling: check.sampling(),
    };
    let handle = orchestrator.spawn(reader, Box::new(detector), request, cancel)?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );

    let mut finished = None;
    loop {
        let event = match events.recv_timeout(EVENT_POLL) {
            Ok(event) => event,
            // The worker is gone without a terminal event; join reports why.
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let terminal = event.is_terminal();
        match event {
            PipelineEvent::Log(line) => pb.println(line),
            PipelineEvent::Progress(percent) => pb.set_position(percent as u64),
            PipelineEvent::FramePreview { index, image } => {
                pb.set_message(format!("frame #{} ({}x{})", index, image.width(), image.height()))
            }
            PipelineEvent::Completed(report) => {
                pb.finish_with_message("Done");
                finished = Some(report);
            }
            PipelineEvent::Cancelled(report) => {
                pb.abandon_with_message("Stopped early");
                finished = Some(report);
            }
            PipelineEvent::Failed {
                message,
                class,
                partial,
            } => {
                pb.abandon_with_message(format!("Failed ({:?})", class));
                if let Some(path) = partial.as_ref().and_then(|r| r.report_file.as_ref()) {
                    eprintln!("Partial report saved to {}: {}", path.display(), message);
                }
            }
        }
        if terminal {
            break;
        }
    }

    let joined = handle.join()?;
    tracing::debug!("Run finished in state {}", orchestrator.state());
    let report = finished.unwrap_or(joined);
    print_summary(&report);
    if check.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Cancel the run once `max_frames` frames have been fully processed.
fn stop_after(sinks: &mut EventSinks, max_frames: usize, cancel: CancelHandle) {
    let forward = sinks.frame_preview.take();
    let processed = AtomicUsize::new(0);
    sinks.frame_preview = Some(Box::new(move |index, image: &RgbImage| {
        if let Some(forward) = &forward {
            forward(index, image);
        }
        if processed.fetch_add(1, Ordering::Relaxed) + 1 >= max_frames {
            cancel.cancel();
        }
    }));
}

fn print_summary(report: &Report) {
    println!();
    println!("Status: {}", report.outcome);
    println!("Frames processed: {}", report.total_frames_processed);
    if report.frames_skipped > 0 {
        println!("Frames skipped: {}", report.frames_skipped);
    }
    println!("Frames with errors: {}", report.frames_with_errors_count());
    println!("Total errors: {}", report.total_error_count);
    if let Some(path) = &report.report_file {
        println!("Report: {}", path.display());
    }
}

fn info(config: &SpellerConfig, video: &Path) -> Result<()> {
    let reader = open_reader(video, config.backend)?;
    let fps = reader.source_fps()?;
    let total_frames = reader.frame_count()?;
    if !fps.is_finite() || fps <= 0.0 {
        return Err(SpellerError::InvalidFps(fps).into());
    }

    let duration = total_frames as f64 / fps;
    println!("Video: {}", video.display());
    println!("FPS: {:.2}", fps);
    println!("Frames: {}", total_frames);
    println!("Duration: {} ({:.2} s)", format_clock(duration), duration);
    Ok(())
}

fn dictionaries(config: &SpellerConfig) -> Result<()> {
    for status in dictionary_status(&config.dictionary_dir) {
        let state = if status.available { "available" } else { "missing" };
        println!(
            "{:<8} {:<9} {}",
            status.language.display_name(),
            state,
            status.dic_path.display()
        );
    }

    if config.whitelist_path.is_file() {
        let whitelist = Whitelist::load(&config.whitelist_path)?;
        if whitelist.is_empty() {
            println!("Whitelist: {} has no words", config.whitelist_path.display());
            return Ok(());
        }
        println!(
            "Whitelist: {} words in {}",
            whitelist.len(),
            config.whitelist_path.display()
        );
    } else {
        println!("Whitelist: not found at {}", config.whitelist_path.display());
    }
    Ok(())
}
