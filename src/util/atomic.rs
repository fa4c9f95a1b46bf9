use anyhow::{Context, Result};
use std::path::Path;

fn temp_sibling(dst: &Path) -> std::path::PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};
    // Randomized temp filename so a concurrent writer cannot predict the path
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    dst.with_extension(format!("tmp.{:016x}", suffix))
}

/// Writes `content` to `dst` using write-to-temp-then-rename so the
/// destination is never observed in a partial state.
pub fn atomic_write(dst: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let temp_path = temp_sibling(dst);

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // fails if the temp path exists (symlink race)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions or disk space",
                temp_path.display()
            )
        })?;

    file.write_all(content).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to write to temporary file '{}': disk may be full",
            temp_path.display()
        )
    })?;

    file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to sync temporary file '{}' to disk",
            temp_path.display()
        )
    })?;

    drop(file);

    // rename on the same filesystem is atomic on POSIX
    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to remove existing '{}' before replace", dst.display())
        })?;
    }

    std::fs::rename(&temp_path, dst).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}': check permissions",
            temp_path.display(),
            dst.display()
        )
    })?;

    Ok(())
}

/// Atomically copies `src` to `dst`. Used for OPML import and backups.
pub fn atomic_copy(src: &Path, dst: &Path) -> Result<()> {
    let content = std::fs::read(src).with_context(|| {
        format!(
            "Failed to read source file '{}': check file permissions",
            src.display()
        )
    })?;
    atomic_write(dst, &content)
}
