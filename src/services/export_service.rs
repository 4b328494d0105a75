use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::models::ExportFormat;
use crate::services::grid_orchestrator::GridOrchestrator;

/// Writes exports produced by the data service to disk
pub struct ExportService {
    output_dir: PathBuf,
}

impl ExportService {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export the grid's current request and save it. Returns the written path.
    pub async fn export_grid(
        &self,
        grid: &GridOrchestrator,
        format: ExportFormat,
        include_stats: bool,
    ) -> Result<PathBuf> {
        let bytes = grid
            .export(format, include_stats)
            .await
            .context("Export request failed")?;
        let stem = grid
            .dataset()
            .map(|d| file_stem(&d.filename))
            .unwrap_or_else(|| "data".to_string());
        self.write(&stem, format, &bytes)
    }

    /// Save `bytes` as `<stem>_export_<timestamp>.<ext>`
    pub fn write(&self, stem: &str, format: ExportFormat, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create export directory {}", self.output_dir.display())
        })?;
        let path = self.output_dir.join(export_filename(stem, format));
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(target: "export", "Exported {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Save to an explicit path, creating parent directories
    pub fn write_to(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(target: "export", "Exported {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// `<stem>_export_<YYYYmmdd_HHMMSS>.<ext>`
pub fn export_filename(stem: &str, format: ExportFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_export_{}.{}", stem, timestamp, format.extension())
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "data".to_string())
}
