use std::sync::Arc;

use filexfer_fabric::{HandlerFuture, RequestHandler, Sender};
use filexfer_protocol::envelope::Message;
use filexfer_protocol::{SegmentResponse, StoreSegmentRequest, file_store_topic};
use filexfer_transfer::{FileStoreManager, TransferError};
use tracing::{info, warn};

use crate::ServiceError;

/// Request handler for the file-store topic.
pub struct FileStoreService {
    manager: Arc<FileStoreManager>,
    topic: String,
}

impl FileStoreService {
    /// Serves `manager` on the topic for `service_id` (or the default topic).
    pub fn new(manager: FileStoreManager, service_id: Option<&str>) -> Self {
        let topic = file_store_topic(service_id);
        info!(topic = %topic, storage = %manager.storage_dir().display(), "file store service ready");
        Self {
            manager: Arc::new(manager),
            topic,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn manager(&self) -> &Arc<FileStoreManager> {
        &self.manager
    }

    /// Processes one request and builds the reply to send back.
    pub async fn handle(&self, msg: &Message) -> Message {
        let result = match self.store(msg).await {
            Ok(resp) => msg.reply(&resp).map_err(ServiceError::from),
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            warn!(topic = %msg.topic, file_id = ?msg.field("file_id"), error = %e, "file store request failed");
            msg.reply_error(e.code(), e.to_string())
        })
    }

    async fn store(&self, msg: &Message) -> Result<SegmentResponse, ServiceError> {
        if msg.topic != self.topic {
            return Err(ServiceError::UnknownTopic(msg.topic.clone()));
        }

        let request =
            StoreSegmentRequest::from_fields(&msg.other_fields).map_err(TransferError::from)?;
        let manager = Arc::clone(&self.manager);
        let payload = msg.payload.clone();

        let resp = tokio::task::spawn_blocking(move || manager.store_segment(&request, &payload))
            .await
            .map_err(|e| ServiceError::Task(e.to_string()))??;
        Ok(resp)
    }
}

impl RequestHandler for FileStoreService {
    fn on_request(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let reply = self.handle(&msg).await;
            if sender.send_msg(reply).is_err() {
                warn!(id = %msg.id, "failed to queue reply");
            }
        })
    }
}
