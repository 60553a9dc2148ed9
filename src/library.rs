use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "flac"];

/// Lists the playable files directly inside `root`, in directory enumeration
/// order. Subdirectories are not descended into. A root that cannot be read
/// is an error; unreadable entries inside it are too.
pub fn scan_folder(root: &Path) -> Result<Vec<PathBuf>> {
    let mut tracks = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = entry.with_context(|| format!("failed to read folder {}", root.display()))?;
        if !entry.file_type().is_file() || !is_audio(entry.path()) {
            continue;
        }
        tracks.push(entry.into_path());
    }

    Ok(tracks)
}

fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}
