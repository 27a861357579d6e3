//! File transfer client: drives the segment request sequence for one file.

use std::collections::BTreeMap;
use std::path::Path;

use filexfer_protocol::constants::DEFAULT_MAX_SEGMENT_SIZE;
use filexfer_protocol::{
    FileSendResult, FileStoreResult, HashType, SegmentResponse, StoreSegmentRequest,
    file_store_topic,
};
use filexfer_transfer::{SegmentReader, segment_count};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::FabricConnection;
use crate::error::SendError;
use crate::types::{ProgressObserver, SegmentProgress};

/// Sends files to a file store service, one segment at a time.
pub struct FileTransferClient<'a> {
    conn: &'a dyn FabricConnection,
    topic: String,
    max_segment_size: usize,
    cancel: CancellationToken,
}

impl<'a> FileTransferClient<'a> {
    /// Creates a client that talks to the default store service topic.
    pub fn new(conn: &'a dyn FabricConnection) -> Self {
        Self {
            conn,
            topic: file_store_topic(None),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the maximum segment size. 0 selects the default.
    pub fn with_max_segment_size(mut self, max_segment_size: usize) -> Self {
        self.max_segment_size = if max_segment_size == 0 {
            DEFAULT_MAX_SEGMENT_SIZE
        } else {
            max_segment_size
        };
        self
    }

    /// Targets the store service registered under `service_id`.
    pub fn with_service_id(mut self, service_id: &str) -> Self {
        self.topic = file_store_topic(Some(service_id));
        self
    }

    /// Uses `cancel` for cooperative cancellation of sends.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Sends the local file at `path`, stored as `<store_subdir>/<basename>`.
    pub async fn send_file(
        &self,
        path: &Path,
        store_subdir: Option<&str>,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<FileSendResult, SendError> {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SendError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no file name in path: {}", path.display()),
                ))
            })?;

        let name = match store_subdir.map(|s| s.trim_end_matches(['/', '\\'])) {
            Some(subdir) if !subdir.is_empty() => format!("{subdir}/{basename}"),
            _ => basename,
        };
        self.store_file(path, &name, observer).await
    }

    /// Sends the local file at `path`, stored under `name` on the receiver.
    pub async fn store_file(
        &self,
        path: &Path,
        name: &str,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<FileSendResult, SendError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        self.store_file_from_stream(file, name, Some(size), observer)
            .await
    }

    /// Sends everything `reader` yields, stored under `name` on the receiver.
    ///
    /// When `size` is known, the segment carrying the last byte is the
    /// terminal one; otherwise the stream ends with an empty terminal
    /// segment. If anything fails after the receiver assigned a file id,
    /// a single cancel request is sent before the error is returned.
    pub async fn store_file_from_stream<R>(
        &self,
        reader: R,
        name: &str,
        size: Option<u64>,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<FileSendResult, SendError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file_id: Option<String> = None;

        match self
            .drive(reader, name, size, observer, &mut file_id)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Some(file_id) = file_id {
                    warn!(file_id = %file_id, error = %e, "transfer failed, canceling");
                    self.cancel_transfer(&file_id, name).await;
                }
                Err(e)
            }
        }
    }

    /// Runs the segment loop. `file_id` is filled in as soon as the
    /// receiver assigns one so the caller can cancel on failure.
    async fn drive<R>(
        &self,
        reader: R,
        name: &str,
        size: Option<u64>,
        observer: Option<&dyn ProgressObserver>,
        file_id: &mut Option<String>,
    ) -> Result<FileSendResult, SendError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut segments = SegmentReader::new(reader, self.max_segment_size);
        let total_segments = size.map(|s| segment_count(s, segments.max_segment_size()));
        let mut segment_number: u64 = 0;

        loop {
            self.check_cancelled()?;
            segment_number += 1;

            let data = segments.next_segment().await?;
            let bytes_read = segments.bytes_read();
            let terminal = data.is_empty()
                || size == Some(bytes_read)
                || total_segments == Some(segment_number);

            let mut request = StoreSegmentRequest {
                file_id: file_id.clone(),
                name: Some(name.to_string()),
                segment_number: Some(segment_number),
                total_segments,
                ..Default::default()
            };
            if terminal {
                request.result = Some(FileStoreResult::Store);
                request.size = Some(bytes_read);
                request.hash_sha256 = Some(segments.hexdigest());
            }

            debug!(
                segment = segment_number,
                bytes = data.len(),
                terminal,
                "sending segment"
            );
            let response = self.send(&request, data).await?;

            let id = file_id
                .get_or_insert_with(|| {
                    info!(file_id = %response.file_id, name = %name, "receiver assigned file id");
                    response.file_id.clone()
                })
                .clone();

            if let Some(observer) = observer {
                observer.on_segment(&SegmentProgress {
                    file_id: id.clone(),
                    segments_received: response.segments_received,
                    total_segments,
                    result: response.result,
                });
            }

            if terminal {
                if response.result != Some(FileStoreResult::Store) {
                    return Err(SendError::Protocol(format!(
                        "terminal segment acknowledged without store result for file id '{id}'"
                    )));
                }
                info!(file_id = %id, size = bytes_read, "file stored");

                let mut hashes = BTreeMap::new();
                hashes.insert(HashType::Sha256.as_str().to_string(), segments.hexdigest());
                return Ok(FileSendResult {
                    file_id: id,
                    size: bytes_read,
                    hashes,
                });
            }
        }
    }

    /// Issues one request and decodes the segment response.
    async fn send(
        &self,
        request: &StoreSegmentRequest,
        payload: Vec<u8>,
    ) -> Result<SegmentResponse, SendError> {
        let resp = self
            .conn
            .request(&self.topic, request.to_fields(), payload)
            .await?;

        if let Some(err) = &resp.error {
            return Err(SendError::Service {
                code: err.code,
                message: err.message.clone(),
            });
        }

        resp.parse_payload::<SegmentResponse>()?
            .ok_or_else(|| SendError::Protocol("empty segment response".into()))
    }

    /// Best-effort cancel; failures are logged and swallowed.
    async fn cancel_transfer(&self, file_id: &str, name: &str) {
        let request = StoreSegmentRequest {
            file_id: Some(file_id.to_string()),
            name: Some(name.to_string()),
            result: Some(FileStoreResult::Cancel),
            ..Default::default()
        };
        match self.send(&request, Vec::new()).await {
            Ok(_) => info!(file_id = %file_id, "canceled transfer"),
            Err(e) => warn!(file_id = %file_id, error = %e, "failed to cancel transfer"),
        }
    }

    fn check_cancelled(&self) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            Err(SendError::Cancelled)
        } else {
            Ok(())
        }
    }
}
