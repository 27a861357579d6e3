use std::path::{Path, PathBuf};

use filexfer_protocol::{FileStoreResult, SegmentResponse, StoreSegmentRequest};
use tracing::{debug, info, warn};

use crate::registry::{FileEntryRegistry, SharedEntry};
use crate::types::FileEntry;
use crate::validation::{normalize, resolve_destination, validate_file_id};
use crate::{DEFAULT_WORKING_SUBDIR, TransferError, lock};

/// What a terminal `store` request asks for, validated up front.
struct StoreTarget<'a> {
    destination: PathBuf,
    size: u64,
    hash: &'a str,
}

/// Reconstructs files from sequenced segment deliveries.
///
/// Segments are appended to a private working file per transfer. A
/// terminal `store` verifies size and hash and then moves the file into
/// the storage directory; a terminal `cancel` (or any failure) discards it.
pub struct FileStoreManager {
    storage_dir: PathBuf,
    working_dir: PathBuf,
    registry: FileEntryRegistry,
}

impl FileStoreManager {
    /// Creates the manager, creating both directories if needed.
    ///
    /// `working_dir` defaults to `<storage_dir>/.workdir`. Leftovers from
    /// transfers that never completed are purged before returning.
    pub fn new(
        storage_dir: impl AsRef<Path>,
        working_dir: Option<&Path>,
    ) -> Result<Self, TransferError> {
        let storage_dir = normalize(&std::path::absolute(storage_dir.as_ref())?);
        std::fs::create_dir_all(&storage_dir)?;
        info!(path = %storage_dir.display(), "using storage dir");

        let working_dir = match working_dir {
            Some(dir) => normalize(&std::path::absolute(dir)?),
            None => storage_dir.join(DEFAULT_WORKING_SUBDIR),
        };
        std::fs::create_dir_all(&working_dir)?;
        info!(path = %working_dir.display(), "using working dir");

        let registry = FileEntryRegistry::new(working_dir.clone());
        let purged = registry.purge_incomplete()?;
        if purged > 0 {
            info!(count = purged, "purged incomplete transfers");
        }

        Ok(Self {
            storage_dir,
            working_dir,
            registry,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Ids of transfers currently in progress.
    pub fn active_transfers(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Processes one segment request.
    ///
    /// Blocking: performs file I/O on the calling thread.
    pub fn store_segment(
        &self,
        request: &StoreSegmentRequest,
        payload: &[u8],
    ) -> Result<SegmentResponse, TransferError> {
        if let Some(file_id) = request.file_id.as_deref() {
            validate_file_id(file_id)?;
        }

        let destination = request
            .name
            .as_deref()
            .map(|name| resolve_destination(&self.storage_dir, &self.working_dir, name))
            .transpose()?;

        let target = match request.result {
            Some(FileStoreResult::Store) => Some(StoreTarget {
                destination: destination.ok_or_else(|| {
                    TransferError::Validation("file name must be specified for store request".into())
                })?,
                size: request.size.ok_or_else(|| {
                    TransferError::Validation("file size must be specified for store request".into())
                })?,
                hash: request.hash_sha256.as_deref().ok_or_else(|| {
                    TransferError::Validation("file hash must be specified for store request".into())
                })?,
            }),
            Some(FileStoreResult::Cancel) => return self.cancel(request.file_id.as_deref()),
            None => None,
        };

        let shared = self.resolve_entry(request)?;
        let mut entry = lock(&shared);
        if entry.is_closed() {
            return Err(TransferError::Validation(format!(
                "no transfer in progress for file id '{}'",
                entry.file_id()
            )));
        }

        match self.apply(&mut entry, request.segment_number, payload, target) {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(file_id = %entry.file_id(), error = %e, "discarding failed transfer");
                if let Err(cleanup) = self.registry.discard(&mut entry) {
                    warn!(file_id = %entry.file_id(), error = %cleanup, "failed to remove working dir");
                }
                Err(e)
            }
        }
    }

    /// Finds the entry a non-cancel request belongs to, creating it for a
    /// new transfer.
    fn resolve_entry(&self, request: &StoreSegmentRequest) -> Result<SharedEntry, TransferError> {
        match request.file_id.as_deref() {
            None => self.registry.create(None),
            Some(file_id) if request.segment_number == Some(1) => {
                self.registry.create(Some(file_id))
            }
            Some(file_id) => self.registry.get(file_id).ok_or_else(|| {
                TransferError::Validation(format!(
                    "no transfer in progress for file id '{file_id}'"
                ))
            }),
        }
    }

    fn apply(
        &self,
        entry: &mut FileEntry,
        segment_number: Option<u64>,
        payload: &[u8],
        target: Option<StoreTarget<'_>>,
    ) -> Result<SegmentResponse, TransferError> {
        entry.advance(segment_number)?;
        debug!(
            file_id = %entry.file_id(),
            segment = entry.segments_received(),
            bytes = payload.len(),
            "storing segment"
        );
        entry.append(payload)?;

        let result = match target {
            Some(target) => {
                verify(entry, target.size, target.hash)?;
                publish(&entry.working_file(), &target.destination)?;
                info!(
                    file_id = %entry.file_id(),
                    path = %target.destination.display(),
                    "stored file"
                );
                self.registry.discard(entry)?;
                Some(FileStoreResult::Store)
            }
            None => None,
        };

        Ok(SegmentResponse {
            file_id: entry.file_id().to_string(),
            segments_received: entry.segments_received(),
            result,
        })
    }

    /// Discards a transfer. Unknown ids are accepted and left untouched.
    fn cancel(&self, file_id: Option<&str>) -> Result<SegmentResponse, TransferError> {
        let file_id = file_id.ok_or_else(|| {
            TransferError::Validation("file id must be specified for cancel request".into())
        })?;

        let mut segments_received = 0;
        match self.registry.get(file_id) {
            Some(shared) => {
                let mut entry = lock(&shared);
                segments_received = entry.segments_received();
                if !entry.is_closed() {
                    self.registry.discard(&mut entry)?;
                    info!(file_id = %file_id, "canceled storage of file");
                }
            }
            None => debug!(file_id = %file_id, "cancel for unknown file id"),
        }

        Ok(SegmentResponse {
            file_id: file_id.to_string(),
            segments_received,
            result: Some(FileStoreResult::Cancel),
        })
    }
}

/// Checks the working file against the declared size and hash.
///
/// The hash is only compared when something was stored.
fn verify(entry: &FileEntry, size: u64, hash: &str) -> Result<(), TransferError> {
    let stored_size = std::fs::metadata(entry.working_file())?.len();
    if stored_size != size {
        return Err(TransferError::Integrity(format!(
            "file '{}': unexpected file size, declared {size}, stored {stored_size}",
            entry.file_id()
        )));
    }
    if stored_size > 0 {
        let stored_hash = entry.hexdigest();
        if !stored_hash.eq_ignore_ascii_case(hash) {
            return Err(TransferError::Integrity(format!(
                "file '{}': unexpected file hash, declared {hash}, stored {stored_hash}",
                entry.file_id()
            )));
        }
    }
    Ok(())
}

/// Moves the verified working file to `destination`, replacing any file there.
fn publish(working_file: &Path, destination: &Path) -> Result<(), TransferError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(destination) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::rename(working_file, destination)?;
    Ok(())
}
