use filexfer_protocol::FileStoreResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Progress reported after every acknowledged segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentProgress {
    pub file_id: String,
    /// Counter reported by the receiver.
    pub segments_received: u64,
    /// Known only when the source size was known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_segments: Option<u64>,
    /// Set on the terminal segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FileStoreResult>,
}

/// Receives [`SegmentProgress`] updates during a send.
pub trait ProgressObserver: Send + Sync {
    fn on_segment(&self, progress: &SegmentProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&SegmentProgress) + Send + Sync,
{
    fn on_segment(&self, progress: &SegmentProgress) {
        self(progress)
    }
}

/// Forwards progress into a channel; a closed receiver is ignored.
impl ProgressObserver for mpsc::UnboundedSender<SegmentProgress> {
    fn on_segment(&self, progress: &SegmentProgress) {
        let _ = self.send(progress.clone());
    }
}
