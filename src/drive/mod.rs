mod types;
pub(crate) use self::types::RemoteFileRecord;
use self::types::{sort_by_recency, ApiErrorBody, FileListPage};
use crate::auth::Credential;
use crate::consts::{EXCEL_EXTENSIONS, LIST_PAGE_SIZE};
use futures_util::StreamExt;
use md5::{Digest, Md5};
use reqwest::{Client, Response, Url};
use thiserror::Error;

/// Metadata fields requested for each listed file
static LIST_FIELDS: &str = "nextPageToken, files(id, name, modifiedTime, md5Checksum)";

/// Build the HTTP client shared by authentication and Drive requests
pub(crate) fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
}

/// Client for the subset of the Drive v3 API used by a sync pass
#[derive(Clone, Debug)]
pub(crate) struct DriveClient {
    http: Client,
    credential: Credential,
    /// `{api_base}files`
    files_url: Url,
}

impl DriveClient {
    /// `api_base` must be a base URL ending in a slash, as produced by
    /// [`SyncConfig`](crate::config::SyncConfig).  Files are addressed under
    /// `{api_base}files`.
    pub(crate) fn new(http: Client, api_base: &Url, credential: Credential) -> DriveClient {
        let mut files_url = api_base.clone();
        if let Ok(mut segments) = files_url.path_segments_mut() {
            segments.pop_if_empty().push("files");
        }
        DriveClient {
            http,
            credential,
            files_url,
        }
    }

    /// List the Excel files directly inside the folder `folder_id`, most
    /// recently modified first.
    ///
    /// Files are matched by name substring, so `report.xlsx.bak` is listed
    /// too.  All result pages are fetched.  The records are re-sorted
    /// locally (stably) so that callers can rely on the order even if the
    /// server's ordering was not honored.
    pub(crate) async fn list_candidate_files(
        &self,
        folder_id: &str,
    ) -> Result<Vec<RemoteFileRecord>, ListError> {
        let q = list_query(folder_id);
        let page_size = LIST_PAGE_SIZE.to_string();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", q.as_str()),
                ("fields", LIST_FIELDS),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(ref tok) = page_token {
                params.push(("pageToken", tok.as_str()));
            }
            tracing::debug!(folder_id, page_token = ?page_token, "Requesting page of file listing");
            let response = self
                .http
                .get(self.files_url.clone())
                .bearer_auth(self.credential.access_token())
                .query(&params)
                .send()
                .await
                .map_err(|e| ListError::new(folder_id, RequestError::Send(e)))?;
            let response = check_status(response)
                .await
                .map_err(|e| ListError::new(folder_id, e))?;
            let page = response
                .json::<FileListPage>()
                .await
                .map_err(|e| ListError::new(folder_id, RequestError::Decode(e)))?;
            tracing::debug!(
                folder_id,
                count = page.files.len(),
                "Received page of file listing"
            );
            records.extend(page.files);
            match page.next_page_token {
                Some(tok) if !tok.is_empty() => page_token = Some(tok),
                _ => break,
            }
        }
        sort_by_recency(&mut records);
        Ok(records)
    }

    /// Download the content of `record`, reading the response body chunk by
    /// chunk into memory.  If Drive reported an MD5 checksum for the file,
    /// the content is verified against it.
    #[tracing::instrument(skip_all, fields(file_id = %record.id))]
    pub(crate) async fn download_file(
        &self,
        record: &RemoteFileRecord,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.file_url(&record.id);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.credential.access_token())
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(RequestError::Send)?;
        let response = check_status(response).await?;
        let mut content = Vec::with_capacity(
            response
                .content_length()
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or_default(),
        );
        let mut hasher = Md5::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(RequestError::Read)?;
            tracing::trace!(
                chunk_size = chunk.len(),
                received = content.len() + chunk.len(),
                "Received chunk"
            );
            hasher.update(&chunk);
            content.extend_from_slice(&chunk);
        }
        if let Some(ref expected_md5) = record.md5_checksum {
            let actual_md5 = hex::encode(hasher.finalize());
            if !actual_md5.eq_ignore_ascii_case(expected_md5) {
                return Err(FetchError::Verify {
                    expected_md5: expected_md5.clone(),
                    actual_md5,
                });
            }
        }
        Ok(content)
    }

    /// `{files_url}/{file_id}`, with `file_id` percent-encoded as a single
    /// path segment
    fn file_url(&self, file_id: &str) -> Url {
        let mut url = self.files_url.clone();
        // `files_url` is derived from a base URL, so it always has path
        // segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(file_id);
        }
        url
    }
}

/// The Drive search query selecting Excel files in `folder_id`
fn list_query(folder_id: &str) -> String {
    let names = EXCEL_EXTENSIONS
        .iter()
        .map(|ext| format!("name contains '{ext}'"))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("'{}' in parents and ({names})", escape_query_literal(folder_id))
}

/// Escape a value for use inside a single-quoted Drive query string
fn escape_query_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Turn a non-2xx response into an error carrying the API's error message
async fn check_status(response: Response) -> Result<Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody { error }) if !error.message.is_empty() => error.message,
        _ => body.trim().to_owned(),
    };
    Err(RequestError::Status {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Error)]
pub(crate) enum RequestError {
    #[error("failed to send request to Drive API")]
    Send(#[source] reqwest::Error),
    #[error("Drive API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to read response body from Drive API")]
    Read(#[source] reqwest::Error),
    #[error("failed to decode response from Drive API")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
#[error("failed to list files in Drive folder {folder_id:?}")]
pub(crate) struct ListError {
    folder_id: String,
    source: RequestError,
}

impl ListError {
    fn new(folder_id: &str, source: RequestError) -> ListError {
        ListError {
            folder_id: folder_id.to_owned(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("checksum verification failed; expected {expected_md5}, got {actual_md5}")]
    Verify {
        expected_md5: String,
        actual_md5: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DriveClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        DriveClient::new(
            Client::new(),
            &base,
            Credential::new("ya29.test".into(), None),
        )
    }

    fn record(id: &str, name: &str, modified_time: &str) -> RemoteFileRecord {
        RemoteFileRecord {
            id: id.to_owned(),
            name: name.to_owned(),
            modified_time: modified_time.to_owned(),
            md5_checksum: None,
        }
    }

    #[test]
    fn query() {
        assert_eq!(
            list_query("1zsij"),
            "'1zsij' in parents and (name contains '.xlsx' or name contains '.xls')"
        );
        assert_eq!(
            list_query("it's"),
            r"'it\'s' in parents and (name contains '.xlsx' or name contains '.xls')"
        );
    }

    #[test]
    fn file_urls() {
        let base = Url::parse("https://www.googleapis.com/drive/v3/").unwrap();
        let client = DriveClient::new(Client::new(), &base, Credential::new("t".into(), None));
        assert_eq!(
            client.file_url("1AbC-_9").as_str(),
            "https://www.googleapis.com/drive/v3/files/1AbC-_9"
        );
        assert_eq!(
            client.file_url("a/b c").as_str(),
            "https://www.googleapis.com/drive/v3/files/a%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn list_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(header("authorization", "Bearer ya29.test"))
            .and(query_param(
                "q",
                "'folder1' in parents and (name contains '.xlsx' or name contains '.xls')",
            ))
            .and(query_param("orderBy", "modifiedTime desc"))
            .and(query_param("fields", LIST_FIELDS))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nextPageToken": "page2",
                "files": [
                    {"id": "a", "name": "MDCReport_609.xlsx", "modifiedTime": "2024-06-03T00:00:00.000Z"},
                    {"id": "b", "name": "CertPercent.xlsx", "modifiedTime": "2024-06-02T00:00:00.000Z"},
                ],
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("pageToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "c", "name": "MDCReport_1002.xls", "modifiedTime": "2024-06-01T00:00:00.000Z"},
                ],
            })))
            .expect(1)
            .mount(&server)
            .await;
        let records = client(&server)
            .list_candidate_files("folder1")
            .await
            .unwrap();
        let ids = records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn list_sorts_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "old", "name": "FranchiseDashboard_old.xlsx", "modifiedTime": "2024-01-01T00:00:00.000Z"},
                    {"id": "new", "name": "FranchiseDashboard_new.xlsx", "modifiedTime": "2024-06-01T00:00:00.000Z"},
                ],
            })))
            .mount(&server)
            .await;
        let records = client(&server)
            .list_candidate_files("folder1")
            .await
            .unwrap();
        let ids = records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["new", "old"]);
    }

    #[tokio::test]
    async fn list_empty_folder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
            .mount(&server)
            .await;
        let records = client(&server)
            .list_candidate_files("folder1")
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn list_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "File not found: folder1."},
            })))
            .mount(&server)
            .await;
        let e = client(&server)
            .list_candidate_files("folder1")
            .await
            .unwrap_err();
        assert_eq!(e.folder_id, "folder1");
        assert_matches!(e.source, RequestError::Status { status: 404, .. });
        assert_eq!(
            e.source.to_string(),
            "Drive API returned HTTP 404: File not found: folder1."
        );
    }

    #[tokio::test]
    async fn list_bad_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        let e = client(&server)
            .list_candidate_files("folder1")
            .await
            .unwrap_err();
        assert_matches!(e.source, RequestError::Decode(_));
    }

    #[tokio::test]
    async fn download_content() {
        let server = MockServer::start().await;
        let body = b"PK\x03\x04 workbook bytes".to_vec();
        Mock::given(method("GET"))
            .and(path("/files/abc"))
            .and(query_param("alt", "media"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;
        let mut r = record("abc", "MDCReport_609.xlsx", "2024-06-01T00:00:00.000Z");
        r.md5_checksum = Some(hex::encode(Md5::digest(&body)));
        let content = client(&server).download_file(&r).await.unwrap();
        assert_eq!(content, body);
    }

    #[tokio::test]
    async fn download_checksum_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"truncated".to_vec()))
            .mount(&server)
            .await;
        let mut r = record("abc", "MDCReport_609.xlsx", "2024-06-01T00:00:00.000Z");
        r.md5_checksum = Some("9e107d9d372bb6826bd81d3542a419d6".into());
        let e = client(&server).download_file(&r).await.unwrap_err();
        assert_matches!(e, FetchError::Verify { expected_md5, .. } => {
            assert_eq!(expected_md5, "9e107d9d372bb6826bd81d3542a419d6");
        });
    }

    #[tokio::test]
    async fn download_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/gone"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "The user does not have sufficient permissions for this file."},
            })))
            .mount(&server)
            .await;
        let r = record("gone", "CertPercent.xlsx", "2024-06-01T00:00:00.000Z");
        let e = client(&server).download_file(&r).await.unwrap_err();
        assert_matches!(e, FetchError::Request(RequestError::Status { status: 403, .. }));
    }
}
