/// The Drive folder whose Excel reports are mirrored when `--folder-id` is
/// not given
pub(crate) static DEFAULT_FOLDER_ID: &str = "1zsijSWM7vOVlqjV0F0BztnH3BbX6oHio";

/// Local directory (relative to the working directory) into which reports
/// are written when no OUTDIR is given
pub(crate) static DEFAULT_OUTDIR: &str = "public/data";

/// Environment variable holding the JSON-serialized authorized-user
/// credential
pub(crate) static CREDENTIALS_ENV_VAR: &str = "GOOGLE_DRIVE_CREDENTIALS";

/// OAuth scope requested when refreshing the access token
pub(crate) static DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Base URL of the Drive v3 REST API
pub(crate) static DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";

/// Token endpoint used when the credential does not name one
pub(crate) static DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// File name suffixes treated as Excel workbooks, both when querying Drive
/// and when clearing the destination directory
pub(crate) static EXCEL_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// Number of files requested per page when listing a folder
pub(crate) const LIST_PAGE_SIZE: u32 = 100;

/// Prefix of the temporary files that downloads are written to before being
/// moved into place
pub(crate) static DOWNLOAD_TEMP_PREFIX: &str = ".drivesync.download.";
