//! Reading and writing result files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::result::{RunResult, RunSummary};
use crate::error::ReportError;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
    move |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await.map_err(io_error(path))?;
    debug!(path = %path.display(), "Wrote report");
    Ok(())
}

/// Writes `<results_dir>/<instance_id>.json`.
pub async fn write_result(results_dir: &Path, result: &RunResult) -> Result<PathBuf, ReportError> {
    let path = results_dir.join(format!("{}.json", result.instance_id));
    write_json(&path, result).await?;
    Ok(path)
}

pub async fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), ReportError> {
    write_json(path, summary).await
}

/// Reads every `*.json` result in `results_dir`, sorted by file name.
///
/// Files that do not parse as a result are skipped with a warning.
pub async fn read_results(results_dir: &Path) -> Result<Vec<RunResult>, ReportError> {
    let mut entries = tokio::fs::read_dir(results_dir)
        .await
        .map_err(io_error(results_dir))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error(results_dir))? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(io_error(&path))?;
        match serde_json::from_str::<RunResult>(&content) {
            Ok(result) => results.push(result),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable result"),
        }
    }
    Ok(results)
}
