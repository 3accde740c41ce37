use crate::category::{reduce_to_latest_per_category, Category, CategoryMap};
use crate::cleaner::clear_destination;
use crate::config::SyncConfig;
use crate::consts::DOWNLOAD_TEMP_PREFIX;
use crate::drive::{DriveClient, FetchError, ListError, RemoteFileRecord};
use crate::util::{check_plain_filename, FilenameError};
use anyhow::Context;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

/// Object responsible for mirroring the latest Excel file of each category
/// in a Drive folder into a local directory
#[derive(Debug)]
pub(crate) struct Syncer {
    /// The client for interacting with Drive
    client: DriveClient,

    /// Where to find the files and where to put them
    config: SyncConfig,
}

impl Syncer {
    pub(crate) fn new(client: DriveClient, config: SyncConfig) -> Syncer {
        Syncer { client, config }
    }

    /// List the folder and select the most recent file of each category
    /// without downloading anything
    pub(crate) async fn plan(&self) -> Result<SyncPlan, ListError> {
        tracing::info!(folder_id = %self.config.folder_id, "Listing Excel files in Drive folder ...");
        let records = self
            .client
            .list_candidate_files(&self.config.folder_id)
            .await?;
        let candidates = records.len();
        if candidates == 0 {
            tracing::warn!(folder_id = %self.config.folder_id, "No Excel files found in Drive folder");
        } else {
            tracing::info!(count = candidates, "Found Excel files in Drive folder");
        }
        let selected = reduce_to_latest_per_category(records);
        tracing::info!(count = selected.len(), "Filtered to unique file categories");
        Ok(SyncPlan {
            candidates,
            selected,
        })
    }

    /// Perform one sync pass: list and filter the folder, clear old Excel
    /// files out of the output directory, then download each selected file.
    ///
    /// Failures while listing or clearing abort the pass.  A failure to
    /// download or save an individual file is logged and recorded in the
    /// returned report, and the remaining files are still processed.
    pub(crate) async fn run(&self) -> anyhow::Result<SyncReport> {
        let plan = self.plan().await?;
        tracing::info!(path = %self.config.outdir.display(), "Cleaning old data files ...");
        let removed = clear_destination(&self.config.outdir).with_context(|| {
            format!(
                "failed to clear old files from {}",
                self.config.outdir.display()
            )
        })?;
        tracing::info!(count = removed.len(), "Removed old data files");
        if plan.selected.is_empty() {
            tracing::warn!("No files to download");
        }
        let mut outcomes = Vec::with_capacity(plan.selected.len());
        for (category, record) in plan.selected {
            let result = self.download_and_store(&category, &record).await;
            if let Err(ref e) = result {
                tracing::error!(error = ?e, name = %record.name, %category, "Failed to download file");
            }
            outcomes.push(FileOutcome {
                category,
                record,
                result,
            });
        }
        let report = SyncReport {
            candidates: plan.candidates,
            outcomes,
        };
        tracing::info!(
            downloaded = report.downloaded(),
            failed = report.failed(),
            "Sync pass complete"
        );
        Ok(report)
    }

    /// Download `record` and save it in the output directory under the name
    /// that `category` gives it, replacing any existing file of that name
    #[tracing::instrument(skip_all, fields(name = %record.name, %category))]
    async fn download_and_store(
        &self,
        category: &Category,
        record: &RemoteFileRecord,
    ) -> Result<LocalFile, DownloadError> {
        let filename = category.local_filename(record);
        check_plain_filename(&filename)?;
        let path = self.config.outdir.join(&filename);
        tracing::info!(dest = %path.display(), "Downloading file");
        let content = self.client.download_file(record).await?;
        tracing::trace!("Opening temporary output file");
        let write_err = |source: std::io::Error| DownloadError::Write {
            path: path.clone(),
            source,
        };
        let outfile = tempfile::Builder::new()
            .prefix(DOWNLOAD_TEMP_PREFIX)
            .tempfile_in(&self.config.outdir)
            .map_err(write_err)?;
        outfile
            .as_file()
            .write_all(&content)
            .and_then(|()| outfile.as_file().flush())
            .map_err(write_err)?;
        tracing::trace!(dest = %path.display(), "Moving temporary output file to destination");
        let fp = outfile.persist(&path).map_err(|e| write_err(e.error))?;
        if let Some(mtime) = record.modified_at() {
            if let Err(e) = fp.set_modified(mtime.into()) {
                tracing::warn!(error = %e, path = %path.display(), "Failed to set mtime on downloaded file");
            }
        }
        tracing::info!(path = %path.display(), size = content.len(), "Saved file");
        Ok(LocalFile {
            path,
            size: content.len(),
        })
    }
}

/// The files selected for download by [`Syncer::plan()`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct SyncPlan {
    /// Number of Excel files listed in the folder
    pub(crate) candidates: usize,

    /// The most recent file of each category
    pub(crate) selected: CategoryMap,
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (category, record) in self.selected.iter() {
            writeln!(
                f,
                "{category}\t{}\t{}\t{}",
                record.name,
                record.modified_time,
                category.local_filename(record)
            )?;
        }
        write!(
            f,
            "{} categories selected from {} candidate files",
            self.selected.len(),
            self.candidates
        )
    }
}

/// A file written to the output directory
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct LocalFile {
    pub(crate) path: PathBuf,
    pub(crate) size: usize,
}

/// What happened to one selected file during a sync pass
#[derive(Debug)]
pub(crate) struct FileOutcome {
    pub(crate) category: Category,
    pub(crate) record: RemoteFileRecord,
    pub(crate) result: Result<LocalFile, DownloadError>,
}

/// The result of a sync pass
#[derive(Debug)]
pub(crate) struct SyncReport {
    /// Number of Excel files listed in the folder
    pub(crate) candidates: usize,

    /// One entry per selected file, in download order
    pub(crate) outcomes: Vec<FileOutcome>,
}

impl SyncReport {
    /// Number of files successfully downloaded
    pub(crate) fn downloaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of selected files that could not be downloaded
    pub(crate) fn failed(&self) -> usize {
        self.outcomes.len() - self.downloaded()
    }

    /// A pass succeeds if at least one file was downloaded
    pub(crate) fn is_success(&self) -> bool {
        self.downloaded() > 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for o in &self.outcomes {
            match o.result {
                Ok(ref local) => writeln!(
                    f,
                    "✓ [{}] {} -> {} ({} bytes)",
                    o.category,
                    o.record.name,
                    local.path.display(),
                    local.size
                )?,
                Err(ref e) => {
                    write!(
                        f,
                        "✗ [{}] Error downloading {}: {e}",
                        o.category, o.record.name
                    )?;
                    let mut source = std::error::Error::source(e);
                    while let Some(s) = source {
                        write!(f, ": {s}")?;
                        source = s.source();
                    }
                    writeln!(f)?;
                }
            }
        }
        write!(
            f,
            "{} of {} selected files downloaded ({} candidates listed)",
            self.downloaded(),
            self.outcomes.len(),
            self.candidates
        )
    }
}

/// Error downloading or saving a single file
#[derive(Debug, Error)]
pub(crate) enum DownloadError {
    #[error("cannot save file under its derived name")]
    Filename(#[from] FilenameError),
    #[error("failed to fetch file content")]
    Fetch(#[from] FetchError),
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
