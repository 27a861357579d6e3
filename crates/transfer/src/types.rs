use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Name of the partial file inside a transfer's working directory.
const WORKING_FILE_NAME: &str = "file";

/// Receiver-side state of one in-progress reconstruction.
///
/// Owned by the [`FileEntryRegistry`](crate::FileEntryRegistry) behind its
/// own lock; a closed entry has already been committed or discarded and
/// accepts no further segments.
#[derive(Debug)]
pub struct FileEntry {
    file_id: String,
    segments_received: u64,
    hasher: Sha256,
    working_dir: PathBuf,
    closed: bool,
}

impl FileEntry {
    pub fn new(file_id: String, working_dir: PathBuf) -> Self {
        Self {
            file_id,
            segments_received: 0,
            hasher: Sha256::new(),
            working_dir,
            closed: false,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn segments_received(&self) -> u64 {
        self.segments_received
    }

    /// Private directory holding the partial file.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn working_file(&self) -> PathBuf {
        self.working_dir.join(WORKING_FILE_NAME)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Accepts `segment_number` if it is the next in sequence.
    ///
    /// A missing segment number is treated as 0 and therefore never matches.
    pub fn advance(&mut self, segment_number: Option<u64>) -> Result<(), TransferError> {
        let expected = self.segments_received + 1;
        let received = segment_number.unwrap_or(0);
        if received != expected {
            return Err(TransferError::Sequence { expected, received });
        }
        self.segments_received = expected;
        Ok(())
    }

    /// Appends `data` to the working file and folds it into the running hash.
    ///
    /// The working file is created even when `data` is empty.
    pub fn append(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.working_file())?;
        if !data.is_empty() {
            file.write_all(data)?;
            self.hasher.update(data);
        }
        Ok(())
    }

    /// Hex SHA-256 of everything appended so far.
    pub fn hexdigest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum_bytes;
    use tempfile::TempDir;

    fn entry_in(dir: &TempDir) -> FileEntry {
        FileEntry::new("abc".into(), dir.path().to_path_buf())
    }

    #[test]
    fn advance_accepts_next_segment_only() {
        let dir = TempDir::new().unwrap();
        let mut entry = entry_in(&dir);

        entry.advance(Some(1)).unwrap();
        entry.advance(Some(2)).unwrap();
        assert_eq!(entry.segments_received(), 2);

        let err = entry.advance(Some(4)).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Sequence {
                expected: 3,
                received: 4
            }
        ));
        assert_eq!(entry.segments_received(), 2);
    }

    #[test]
    fn advance_rejects_missing_segment_number() {
        let dir = TempDir::new().unwrap();
        let mut entry = entry_in(&dir);
        assert!(matches!(
            entry.advance(None),
            Err(TransferError::Sequence { received: 0, .. })
        ));
    }

    #[test]
    fn append_accumulates_content_and_hash() {
        let dir = TempDir::new().unwrap();
        let mut entry = entry_in(&dir);

        entry.append(b"Hello").unwrap();
        entry.append(b"").unwrap();
        entry.append(b" World").unwrap();

        let content = std::fs::read(entry.working_file()).unwrap();
        assert_eq!(&content, b"Hello World");
        assert_eq!(entry.hexdigest(), checksum_bytes(b"Hello World"));
    }

    #[test]
    fn empty_append_creates_working_file() {
        let dir = TempDir::new().unwrap();
        let mut entry = entry_in(&dir);
        entry.append(b"").unwrap();
        assert_eq!(std::fs::metadata(entry.working_file()).unwrap().len(), 0);
    }
}
