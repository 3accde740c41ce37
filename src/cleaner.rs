use crate::util::is_excel_filename;
use std::path::{Path, PathBuf};

/// Remove every Excel file directly inside `dir`, creating `dir` first if it
/// does not exist.  Returns the paths of the removed files.
///
/// Entries with non-UTF-8 names, entries with non-Excel names, and
/// directories are left alone.
pub(crate) fn clear_destination(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    tracing::trace!(path = %dir.display(), "Creating output directory");
    fs_err::create_dir_all(dir)?;
    let mut files_to_delete = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !is_excel_filename(&name) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            tracing::warn!(path = %entry.path().display(), "Directory has an Excel file extension; not removing");
            continue;
        }
        files_to_delete.push(entry.path());
    }
    files_to_delete.sort();
    for p in &files_to_delete {
        tracing::debug!(path = %p.display(), "Removing old file");
        fs_err::remove_file(p)?;
    }
    Ok(files_to_delete)
}
