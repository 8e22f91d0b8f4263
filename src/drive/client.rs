//! Google Drive v3 client for file metadata and streamed media downloads.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::error::DriveError;

/// Default Drive v3 API base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Metadata of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Drive file id.
    pub id: String,
    /// File name in Drive.
    #[serde(default)]
    pub name: String,
    /// MIME type reported by Drive.
    pub mime_type: String,
}

/// Read access to a remote file store.
///
/// The download engine only talks to this trait, so tests and alternative
/// stores can stand in for Google Drive.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Fetches metadata for `file_id`.
    async fn file_metadata(&self, file_id: &str) -> Result<RemoteFile, DriveError>;

    /// Streams the content of `file_id` into `path`, replacing any existing
    /// file. Returns the number of bytes written.
    async fn download_to(&self, file_id: &str, path: &Path) -> Result<u64, DriveError>;
}

/// Google Drive client authorised with a bearer access token.
#[derive(Clone)]
pub struct DriveClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl DriveClient {
    /// Creates a client against the public Drive API.
    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL, access_token)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        client: Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.base_url, urlencoding::encode(file_id))
    }

    async fn get(
        &self,
        file_id: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, DriveError> {
        let response = self
            .client
            .get(self.file_url(file_id))
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| DriveError::network(file_id, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DriveError::from_status(file_id, status.as_u16(), body))
    }
}

#[async_trait]
impl FileStorage for DriveClient {
    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn file_metadata(&self, file_id: &str) -> Result<RemoteFile, DriveError> {
        let response = self
            .get(
                file_id,
                &[("fields", "id,name,mimeType"), ("supportsAllDrives", "true")],
            )
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| DriveError::network(file_id, e))?;
        let file: RemoteFile =
            serde_json::from_str(&body).map_err(|e| DriveError::decode(file_id, e))?;
        debug!(mime_type = %file.mime_type, name = %file.name, "file metadata");
        Ok(file)
    }

    #[instrument(skip(self), fields(file_id = %file_id, path = %path.display()))]
    async fn download_to(&self, file_id: &str, path: &Path) -> Result<u64, DriveError> {
        let response = self
            .get(file_id, &[("alt", "media"), ("supportsAllDrives", "true")])
            .await?;

        let mut file = File::create(path)
            .await
            .map_err(|e| DriveError::io(path, e))?;

        let result = stream_to_file(&mut file, response, file_id, path).await;
        if result.is_err() {
            debug!(path = %path.display(), "removing partial file after error");
            drop(file);
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }
}

/// Streams the response body into `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    file_id: &str,
    path: &Path,
) -> Result<u64, DriveError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DriveError::network(file_id, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DriveError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DriveError::io(path, e))?;
    Ok(bytes_written)
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_encodes_id() {
        let client = DriveClient::with_base_url(Client::new(), "http://drive.test/v3/", "tok");
        assert_eq!(client.file_url("a b/c"), "http://drive.test/v3/files/a%20b%2Fc");
    }

    #[test]
    fn test_debug_output_hides_access_token() {
        let client = DriveClient::new(Client::new(), "ya29.SECRET");
        assert!(!format!("{client:?}").contains("SECRET"));
    }
}
