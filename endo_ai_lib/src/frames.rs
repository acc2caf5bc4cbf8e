use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};
use itertools::Itertools;
use tracing::{debug, info};

use crate::error::PipelineError;

/// One extracted video frame on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u64,
    pub path: PathBuf,
}

/// Parses `<index>` out of a `frame_<index>.<ext>` file name.
pub fn parse_frame_index(path: &Path) -> Result<u64> {
    let invalid = || PipelineError::InvalidFrameName(path.to_owned());

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;
    let (prefix, index) = stem.split_once('_').ok_or_else(invalid)?;
    if prefix != "frame" || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid().into());
    }
    index.parse::<u64>().map_err(|_| invalid().into())
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    let suffix = suffix.trim_start_matches('.');
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(suffix))
}

/// Lists `frame_<index><suffix>` files in `dir`, sorted by index.
///
/// Fails when nothing matches or two files share an index.
pub fn discover_frames(dir: &Path, suffix: &str) -> Result<Vec<Frame>> {
    let entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("Failed to read frame directory {}", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || !has_suffix(&path, suffix) {
            continue;
        }
        let index = parse_frame_index(&path)?;
        frames.push(Frame { index, path });
    }

    if frames.is_empty() {
        return Err(PipelineError::NoFrames(dir.to_owned()).into());
    }

    let frames: Vec<Frame> = frames.into_iter().sorted_by_key(|f| f.index).collect();

    if let Some((first, second)) = frames
        .iter()
        .tuple_windows()
        .find(|(a, b)| a.index == b.index)
    {
        return Err(PipelineError::DuplicateFrameIndex {
            index: first.index,
            first: first.path.clone(),
            second: second.path.clone(),
        }
        .into());
    }

    info!("Found {} frames in {}", frames.len(), dir.display());
    Ok(frames)
}

/// Lists the sub-directories of `root`, one per video, sorted by name.
pub fn frame_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root)
        .wrap_err_with(|| format!("Failed to read frames root {}", root.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    if dirs.is_empty() {
        return Err(PipelineError::NoFrames(root.to_owned()).into());
    }
    debug!("Found {} video directories in {}", dirs.len(), root.display());
    Ok(dirs)
}

/// Keeps the first `limit` frames, used for quick test runs.
pub fn limit_frames(mut frames: Vec<Frame>, limit: Option<usize>) -> Vec<Frame> {
    if let Some(n) = limit {
        if n < frames.len() {
            debug!("Test run: using the first {n} of {} frames", frames.len());
            frames.truncate(n);
        }
    }
    frames
}
