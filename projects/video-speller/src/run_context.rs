use crate::error::{SpellerError, SpellerResult};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const FRAME_ARTIFACT_PREFIX: &str = "frame_";
const FRAME_ARTIFACT_SUFFIXES: [&str; 2] = ["_errors.png", "_errors.txt"];

/// Output location of one run and the naming of everything written there.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub output_dir: PathBuf,
    pub started_at: DateTime<Local>,
}

impl RunContext {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            started_at: Local::now(),
        }
    }

    /// Create the output directory and delete per-frame artifacts left by an
    /// earlier run. Aggregate `report-*` files are kept.
    pub fn prepare(&self) -> SpellerResult<usize> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            SpellerError::io(format!("creating output directory {:?}", self.output_dir), e)
        })?;

        let mut removed = 0;
        let stale = WalkDir::new(&self.output_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(is_frame_artifact)
                    .unwrap_or(false)
            });

        for entry in stale {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove {:?}: {}", entry.path(), e),
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} stale frame artifacts from {:?}", removed, self.output_dir);
        }
        Ok(removed)
    }

    pub fn evidence_image_path(&self, frame_index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}{}_errors.png", FRAME_ARTIFACT_PREFIX, frame_index))
    }

    pub fn evidence_text_path(&self, frame_index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}{}_errors.txt", FRAME_ARTIFACT_PREFIX, frame_index))
    }

    /// `report-YYYYMMDD-HHMMSS.<extension>`
    pub fn report_path(&self, extension: &str) -> PathBuf {
        self.output_dir.join(format!(
            "report-{}.{}",
            self.started_at.format("%Y%m%d-%H%M%S"),
            extension
        ))
    }
}

fn is_frame_artifact(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(FRAME_ARTIFACT_PREFIX) else {
        return false;
    };
    FRAME_ARTIFACT_SUFFIXES.iter().any(|suffix| {
        rest.strip_suffix(suffix)
            .map(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}
