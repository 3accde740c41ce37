use crate::consts::EXCEL_EXTENSIONS;
use thiserror::Error;

/// Returns true if `name` ends in one of the Excel file extensions
pub(crate) fn is_excel_filename(name: &str) -> bool {
    EXCEL_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Check that `name` can be used as the name of a file directly inside the
/// output directory, i.e., that it is a single, non-special path component
pub(crate) fn check_plain_filename(name: &str) -> Result<(), FilenameError> {
    if name.is_empty() {
        Err(FilenameError::Empty)
    } else if name == "." || name == ".." {
        Err(FilenameError::Special {
            name: name.to_owned(),
        })
    } else if name.contains(['/', '\\']) {
        Err(FilenameError::Separator {
            name: name.to_owned(),
        })
    } else if name.contains('\0') {
        Err(FilenameError::Nul {
            name: name.to_owned(),
        })
    } else {
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub(crate) enum FilenameError {
    #[error("file name is empty")]
    Empty,
    #[error("file name {name:?} refers to a directory")]
    Special { name: String },
    #[error("file name {name:?} contains a path separator")]
    Separator { name: String },
    #[error("file name {name:?} contains NUL")]
    Nul { name: String },
}
