use crate::error::{ErrorKind, StepError, StepResult};
use crate::http::{error_body, status_error, transport_error};
use crate::orchestration::{StepContext, StepExecutor, StepOutput};
use crate::state_machine::StepKind;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Streams a partition's source file to its local input path.
///
/// The body lands in `<input>.part` first and is renamed into place only once
/// the status, byte limit and declared length all check out.
pub struct DownloadExecutor {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: u64,
}

impl DownloadExecutor {
    pub fn new(client: reqwest::Client, timeout: Duration, max_bytes: u64) -> Self {
        Self {
            client,
            timeout,
            max_bytes,
        }
    }

    async fn fetch(&self, ctx: &StepContext, part_path: &Path) -> StepResult<u64> {
        let url = ctx.partition.source_url();
        let operation = format!("GET {url}");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(&operation, &e, ErrorKind::TransientNetwork))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(status_error(
                &operation,
                status,
                &body,
                None,
                ErrorKind::TransientNetwork,
            ));
        }

        let declared = response.content_length();
        if let Some(length) = declared.filter(|length| *length > self.max_bytes) {
            return Err(StepError::new(
                ErrorKind::ResourceLimit,
                format!("{operation} declares {length} bytes, limit is {}", self.max_bytes),
            ));
        }

        let mut file = tokio::fs::File::create(part_path)
            .await
            .map_err(|e| StepError::local_io(&format!("create {}", part_path.display()), e))?;

        let mut received: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            if ctx.is_cancelled() {
                return Err(StepError::cancelled());
            }
            let chunk =
                chunk.map_err(|e| transport_error(&operation, &e, ErrorKind::TransientNetwork))?;

            received += chunk.len() as u64;
            if received > self.max_bytes {
                return Err(StepError::new(
                    ErrorKind::ResourceLimit,
                    format!("{operation} exceeded the {} byte limit", self.max_bytes),
                ));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| StepError::local_io(&format!("write {}", part_path.display()), e))?;
        }

        file.flush()
            .await
            .map_err(|e| StepError::local_io(&format!("flush {}", part_path.display()), e))?;

        if let Some(length) = declared.filter(|length| *length != received) {
            return Err(StepError::transient_network(format!(
                "{operation} ended after {received} of {length} bytes"
            )));
        }
        Ok(received)
    }
}

/// Temp path a download streams into before the rename
pub fn part_path(local_input: &Path) -> PathBuf {
    let mut name = local_input.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl StepExecutor for DownloadExecutor {
    fn step_kind(&self) -> StepKind {
        StepKind::Download
    }

    #[instrument(skip(self, ctx), fields(partition = %ctx.partition.name(), attempt = ctx.attempt))]
    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        if ctx.is_cancelled() {
            return Err(StepError::cancelled());
        }

        let target = ctx.partition.local_input();
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StepError::local_io(&format!("create {}", parent.display()), e))?;
        }

        let part = part_path(target);
        let bytes = match self.fetch(ctx, &part).await {
            Ok(bytes) => bytes,
            Err(error) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(error);
            }
        };

        if let Err(error) = tokio::fs::rename(&part, target).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(StepError::local_io(
                &format!("rename into {}", target.display()),
                error,
            ));
        }

        debug!(bytes, path = %target.display(), "Source downloaded");
        Ok(StepOutput::Downloaded {
            path: target.to_path_buf(),
            bytes,
        })
    }
}
