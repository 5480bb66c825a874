// Finalize stage: writes per-frame evidence and the aggregate run report.

use crate::error::{SpellerError, SpellerResult};
use crate::run_artifacts::{format_timecode, FrameResult, Report, RunOutcome};
use crate::run_context::RunContext;
use image::RgbImage;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

const RULE: &str = "============================================================";

/// Persist the raster and error listing of a frame that has spelling errors.
/// Names depend only on the frame index, so a rerun overwrites them.
pub fn write_frame_artifacts(
    ctx: &RunContext,
    result: &FrameResult,
    image: &RgbImage,
) -> SpellerResult<()> {
    let image_path = ctx.evidence_image_path(result.frame_index);
    image.save(&image_path).map_err(|e| {
        SpellerError::Fatal(format!("failed to write evidence image {:?}: {}", image_path, e))
    })?;

    let text_path = ctx.evidence_text_path(result.frame_index);
    fs::write(&text_path, render_frame_text(result))
        .map_err(|e| SpellerError::io(format!("writing {:?}", text_path), e))?;

    Ok(())
}

pub fn render_frame_text(result: &FrameResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Frame: {}", result.frame_index);
    let _ = writeln!(out, "Time: {}", format_timecode(result.timecode_secs));
    let _ = writeln!(out);
    let _ = writeln!(out, "Full text:\n{}", result.full_text);
    let _ = writeln!(out);
    let _ = writeln!(out, "Errors found:");
    for error in &result.errors {
        let _ = writeln!(out, "  - {}", error);
    }
    out
}

/// Write `report-<timestamp>.txt` plus its `.json` and `.csv` companions and
/// record the text report's path on `report`.
pub fn write_run_report(ctx: &RunContext, report: &mut Report) -> SpellerResult<PathBuf> {
    let txt_path = ctx.report_path("txt");
    report.report_file = Some(txt_path.clone());

    fs::write(&txt_path, render_report(report))
        .map_err(|e| SpellerError::io(format!("writing report {:?}", txt_path), e))?;

    let json_path = ctx.report_path("json");
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| SpellerError::Fatal(format!("failed to serialize report: {}", e)))?;
    fs::write(&json_path, json)
        .map_err(|e| SpellerError::io(format!("writing report {:?}", json_path), e))?;

    let csv_path = ctx.report_path("csv");
    write_error_table(&csv_path, report)
        .map_err(|e| SpellerError::Fatal(format!("failed to write {:?}: {}", csv_path, e)))?;

    tracing::info!("Report saved to {:?}", txt_path);
    Ok(txt_path)
}

/// One row per spelling error.
fn write_error_table(path: &std::path::Path, report: &Report) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["frame_index", "timecode_secs", "word", "suggestions"])?;
    for frame in &report.frames_with_errors {
        for error in &frame.errors {
            writer.write_record([
                frame.frame_index.to_string(),
                format!("{:.2}", frame.timecode_secs),
                error.word.clone(),
                error.suggestions.join("; "),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "SPELL CHECK REPORT");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Date and time: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "Video file: {}", report.video_path.display());
    let _ = writeln!(out, "Frame interval: {} s", report.interval_secs);
    let _ = writeln!(
        out,
        "Time range: {:.2}s - {:.2}s",
        report.start_secs, report.end_secs
    );
    let status = match &report.outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Cancelled => "cancelled (partial results)".to_string(),
        RunOutcome::Failed { message } => format!("failed (partial results): {}", message),
    };
    let _ = writeln!(out, "Status: {}", status);
    let _ = writeln!(out);

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "STATISTICS");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Frames processed: {}", report.total_frames_processed);
    if report.frames_skipped > 0 {
        let _ = writeln!(out, "Frames skipped: {}", report.frames_skipped);
    }
    let _ = writeln!(out, "Frames with errors: {}", report.frames_with_errors_count());
    let _ = writeln!(out, "Total errors: {}", report.total_error_count);
    let _ = writeln!(out);

    if !report.frames_with_errors.is_empty() {
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "ERROR DETAILS");
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out);
        for (n, frame) in report.frames_with_errors.iter().enumerate() {
            let _ = writeln!(out, "{}. FRAME #{}", n + 1, frame.frame_index);
            let _ = writeln!(out, "   Time: {}", format_timecode(frame.timecode_secs));
            let _ = writeln!(out, "   Errors: {}", frame.errors.len());
            let _ = writeln!(out, "   Recognized text: {}", frame.full_text.replace('\n', " / "));
            let _ = writeln!(out, "   Spelling errors:");
            for error in &frame.errors {
                let _ = writeln!(out, "      - {}", error);
            }
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Results saved to: {}", report.output_dir.display());
    let _ = writeln!(out, "{RULE}");
    out
}
