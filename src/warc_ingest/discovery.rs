//! WARC discovery (spec §4.E).
//!
//! Reads the crawler's `.archive_state.json` to get its tracked
//! temp-directory list, drops entries whose directory no longer
//! exists, and falls back to scanning `output_dir` for `.tmp*`
//! directories when the state file is missing or empty. From each temp
//! dir, enumerates `collections/crawl-*/archive/*.warc.gz`,
//! deduplicates by absolute path, and returns them in stable (sorted)
//! order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::HaResult;

#[derive(Debug, Deserialize, Default)]
struct ArchiveState {
    #[serde(default, alias = "tmp_dirs", alias = "temp_dirs")]
    temp_dirs: Vec<String>,
}

/// Discover every `*.warc.gz` produced by a job, in stable sorted
/// order, deduplicated by absolute path (spec §4.E).
pub async fn discover_warcs(output_dir: &Path) -> HaResult<Vec<PathBuf>> {
    let temp_dirs = tracked_temp_dirs(output_dir).await;

    let temp_dirs = if temp_dirs.is_empty() {
        scan_fallback_temp_dirs(output_dir).await?
    } else {
        temp_dirs
    };

    let mut found = BTreeSet::new();
    for dir in &temp_dirs {
        collect_warcs_under(dir, &mut found).await;
    }

    Ok(found.into_iter().collect())
}

async fn tracked_temp_dirs(output_dir: &Path) -> Vec<PathBuf> {
    let state_path = output_dir.join(".archive_state.json");
    let raw = match tokio::fs::read_to_string(&state_path).await {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };

    let state: ArchiveState = match serde_json::from_str(&raw) {
        Ok(s) => s,
        Err(e) => {
            warn!(?state_path, error = %e, "failed to parse .archive_state.json, falling back to filesystem scan");
            return Vec::new();
        }
    };

    let mut dirs = Vec::new();
    for entry in state.temp_dirs {
        let path = PathBuf::from(&entry);
        let path = if path.is_absolute() { path } else { output_dir.join(&entry) };
        if tokio::fs::metadata(&path).await.is_ok() {
            dirs.push(path);
        }
    }
    dirs
}

/// Fallback used when `.archive_state.json` is absent or its tracked
/// list is empty: scan `output_dir` directly for `.tmp*` directories.
async fn scan_fallback_temp_dirs(output_dir: &Path) -> HaResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(e) => e,
        Err(e) => return Err(crate::error::HaError::from_io_classified("reading output_dir", &e)),
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| crate::error::HaError::from_io_classified("scanning output_dir", &e))? {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_dir && name.starts_with(".tmp") {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

/// Enumerate `collections/crawl-*/archive/*.warc.gz` under one temp dir.
async fn collect_warcs_under(temp_dir: &Path, found: &mut BTreeSet<PathBuf>) {
    let collections_dir = temp_dir.join("collections");
    let Ok(mut crawl_dirs) = tokio::fs::read_dir(&collections_dir).await else {
        return;
    };

    while let Ok(Some(crawl_entry)) = crawl_dirs.next_entry().await {
        let name = crawl_entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("crawl-") {
            continue;
        }
        let archive_dir = crawl_entry.path().join("archive");
        let Ok(mut files) = tokio::fs::read_dir(&archive_dir).await else {
            continue;
        };
        while let Ok(Some(file_entry)) = files.next_entry().await {
            let path = file_entry.path();
            if path.extension().map(|e| e == "gz").unwrap_or(false)
                && path.file_stem().and_then(|s| Path::new(s).extension()).map(|e| e == "warc").unwrap_or(false)
            {
                if let Ok(abs) = tokio::fs::canonicalize(&path).await {
                    found.insert(abs);
                } else {
                    found.insert(path);
                }
            }
        }
    }
}
