use super::{gcs_uri, ObjectStore};
use crate::error::{ErrorKind, StepError, StepResult};
use crate::http::{error_body, status_error, transport_error};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

/// Google Cloud Storage client using the JSON API simple-upload endpoint.
pub struct GcsObjectStore {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    timeout: Duration,
}

impl GcsObjectStore {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timeout,
        }
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!("{}/upload/storage/v1/b/{bucket}/o", self.endpoint)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip(self), fields(backend = "gcs"))]
    async fn put(&self, bucket: &str, key: &str, local_path: &Path) -> StepResult<String> {
        let operation = format!("upload {}", gcs_uri(bucket, key));

        // Reopened on every attempt so a retry streams the whole file again.
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| StepError::local_io(&format!("open {}", local_path.display()), e))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| StepError::local_io(&format!("stat {}", local_path.display()), e))?
            .len();

        let response = self
            .client
            .post(self.upload_url(bucket))
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, length)
            .timeout(self.timeout)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| transport_error(&operation, &e, ErrorKind::StorageTransient))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(status_error(
                &operation,
                status,
                &body,
                Some(ErrorKind::StorageAuth),
                ErrorKind::StorageTransient,
            ));
        }

        debug!(bytes = length, "Object uploaded");
        Ok(gcs_uri(bucket, key))
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url_trims_trailing_slash() {
        let store = GcsObjectStore::new(
            reqwest::Client::new(),
            "https://storage.example.test/",
            "token",
            Duration::from_secs(5),
        );
        assert_eq!(
            store.upload_url("movies"),
            "https://storage.example.test/upload/storage/v1/b/movies/o"
        );
    }
}
