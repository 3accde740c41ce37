use serde::Deserialize;
use std::cmp::Ordering;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Metadata for a file in a Drive folder, as returned by `files.list`
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteFileRecord {
    /// Opaque Drive file ID
    pub(crate) id: String,

    /// Display name of the file
    pub(crate) name: String,

    /// Last modification time as reported by Drive (RFC 3339, UTC, e.g.
    /// `2024-06-01T09:30:00.000Z`)
    pub(crate) modified_time: String,

    /// Hex MD5 digest of the content.  Only set for binary (non-Google
    /// Docs) files.
    #[serde(default)]
    pub(crate) md5_checksum: Option<String>,
}

impl RemoteFileRecord {
    /// The `YYYY-MM-DD` date portion of `modified_time`
    pub(crate) fn modified_date(&self) -> &str {
        self.modified_time
            .get(..10)
            .unwrap_or(&self.modified_time)
    }

    /// `modified_time` parsed as a timestamp, or `None` if it is not valid
    /// RFC 3339
    pub(crate) fn modified_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.modified_time, &Rfc3339).ok()
    }
}

/// Sort records by modification time, most recent first.  The sort is
/// stable, so records with equal timestamps keep their listing order.
///
/// Timestamps are compared as instants, so differing UTC offsets or
/// fractional-second precision do not affect the order.  Records whose
/// `modifiedTime` does not parse come after all others, ordered by the raw
/// string.
pub(crate) fn sort_by_recency(records: &mut [RemoteFileRecord]) {
    records.sort_by(|a, b| match (a.modified_at(), b.modified_at()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.modified_time.cmp(&a.modified_time),
    });
}

/// One page of `files.list` results
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct FileListPage {
    #[serde(default)]
    pub(super) files: Vec<RemoteFileRecord>,
    #[serde(default)]
    pub(super) next_page_token: Option<String>,
}

/// The error envelope returned by Google APIs on failure
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct ApiErrorBody {
    pub(super) error: ApiErrorDetail,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct ApiErrorDetail {
    #[serde(default)]
    pub(super) message: String,
}
