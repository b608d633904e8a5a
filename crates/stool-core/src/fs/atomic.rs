//! Atomic record replacement (tmp + rename).

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;

/// Replace `path` with `bytes` so that concurrent readers see either the old
/// or the new content, never a partial write.
///
/// The temporary file lives next to the target (same filesystem) and is named
/// after the writing process, so two processes never share a temp file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent directory: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    {
        let mut tmp = fs::File::create(&tmp_path)
            .with_context(|| format!("Failed to create tmp file: {}", tmp_path.display()))?;
        tmp.write_all(bytes)
            .with_context(|| format!("Failed to write tmp file: {}", tmp_path.display()))?;
        tmp.sync_all()
            .with_context(|| format!("Failed to sync tmp file: {}", tmp_path.display()))?;
    }

    // rename(2) replaces the target atomically on unix
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err)
            .with_context(|| format!("Failed to rename tmp file onto: {}", path.display()));
    }
    Ok(())
}
