fn main() {
    println!("Run `cargo test -p store-e2e` to execute end-to-end transfer tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use filexfer_client::{FabricConnection, FileTransferClient, SegmentProgress, SendError};
    use filexfer_fabric::{FabricClient, FabricServer, ServerConfig};
    use filexfer_protocol::constants::fields;
    use filexfer_protocol::envelope::Message;
    use filexfer_protocol::{SegmentResponse, file_store_topic};
    use filexfer_service::FileStoreService;
    use filexfer_transfer::{FileStoreManager, checksum_bytes};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    type Server = Arc<FabricServer<FileStoreService>>;

    /// Deterministic, non-repeating-looking test content.
    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 31 + i / 7) % 251) as u8).collect()
    }

    /// Starts a store service on an OS-assigned port and returns its URL.
    async fn start_service(storage: &Path, service_id: Option<&str>) -> (Server, String) {
        let manager = FileStoreManager::new(storage, None).unwrap();
        let service = FileStoreService::new(manager, service_id);
        let server = FabricServer::new(ServerConfig::default(), service);

        let server_run = Arc::clone(&server);
        tokio::spawn(async move {
            server_run.run().await.unwrap();
        });

        let port = loop {
            let p = server.port().await;
            if p > 0 {
                break p;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        (server, format!("ws://127.0.0.1:{port}"))
    }

    fn working_dir_entries(storage: &Path) -> usize {
        std::fs::read_dir(storage.join(".workdir")).unwrap().count()
    }

    fn service_code(err: &SendError) -> i32 {
        match err {
            SendError::Service { code, .. } => *code,
            other => panic!("expected service error, got {other:?}"),
        }
    }

    /// Connection that hands requests straight to a service, no sockets.
    struct LocalFabric {
        service: FileStoreService,
        next_id: AtomicU64,
    }

    impl LocalFabric {
        fn new(storage: &Path) -> Self {
            let manager = FileStoreManager::new(storage, None).unwrap();
            Self {
                service: FileStoreService::new(manager, None),
                next_id: AtomicU64::new(1),
            }
        }

        async fn raw(&self, pairs: &[(&str, &str)], payload: &[u8]) -> Message {
            let other_fields = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.request(self.service.topic(), other_fields, payload.to_vec())
                .await
                .unwrap()
        }
    }

    impl FabricConnection for LocalFabric {
        fn request(
            &self,
            topic: &str,
            other_fields: BTreeMap<String, String>,
            payload: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<Message, SendError>> + Send + '_>> {
            let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
            let msg = Message::request(id, topic, other_fields, payload);
            Box::pin(async move { Ok(self.service.handle(&msg).await) })
        }
    }

    /// Forwards to a real client after rewriting request fields.
    struct Tampering<F> {
        inner: FabricClient,
        rewrite: F,
    }

    impl<F> FabricConnection for Tampering<F>
    where
        F: Fn(&mut BTreeMap<String, String>) + Send + Sync,
    {
        fn request(
            &self,
            topic: &str,
            mut other_fields: BTreeMap<String, String>,
            payload: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<Message, SendError>> + Send + '_>> {
            (self.rewrite)(&mut other_fields);
            self.inner.request(topic, other_fields, payload)
        }
    }

    #[tokio::test]
    async fn round_trip_over_websocket() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), None).await;
        let conn = FabricClient::connect(&url).await.unwrap();

        for (len, segment_size) in [(0, 16), (1, 1), (1000, 7), (1024, 1024), (1025, 1024), (5000, 333)] {
            let data = content(len);
            let name = format!("data/{len}-{segment_size}.bin");
            let client = FileTransferClient::new(&conn).with_max_segment_size(segment_size);

            let result = client
                .store_file_from_stream(&data[..], &name, Some(len as u64), None)
                .await
                .unwrap();

            assert_eq!(result.size, len as u64);
            assert_eq!(result.hashes["sha256"], checksum_bytes(&data));
            assert_eq!(std::fs::read(storage.path().join(&name)).unwrap(), data);
        }

        assert!(server.handler().manager().active_transfers().is_empty());
        assert_eq!(working_dir_entries(storage.path()), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn unknown_size_stream_ends_with_empty_segment() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), None).await;
        let conn = FabricClient::connect(&url).await.unwrap();

        let data = content(2048);
        let (tx, mut rx) = mpsc::unbounded_channel::<SegmentProgress>();
        let result = FileTransferClient::new(&conn)
            .with_max_segment_size(1024)
            .store_file_from_stream(&data[..], "stream.bin", None, Some(&tx))
            .await
            .unwrap();

        assert_eq!(result.size, 2048);
        assert_eq!(std::fs::read(storage.path().join("stream.bin")).unwrap(), data);

        let mut received = Vec::new();
        while let Ok(p) = rx.try_recv() {
            received.push(p.segments_received);
        }
        assert_eq!(received, vec![1, 2, 3]);
        server.shutdown();
    }

    #[tokio::test]
    async fn send_file_places_basename_under_subdir() {
        let storage = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        let local = source.path().join("report.txt");
        std::fs::write(&local, b"quarterly numbers").unwrap();

        let (server, url) = start_service(storage.path(), Some("reports")).await;
        let conn = FabricClient::connect(&url).await.unwrap();

        let client = FileTransferClient::new(&conn).with_service_id("reports");
        assert_eq!(client.topic(), file_store_topic(Some("reports")));
        client.send_file(&local, Some("2026/q3/"), None).await.unwrap();

        assert_eq!(
            std::fs::read(storage.path().join("2026/q3/report.txt")).unwrap(),
            b"quarterly numbers"
        );
        server.shutdown();
    }

    #[tokio::test]
    async fn wrong_service_id_is_not_found() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), Some("alpha")).await;
        let conn = FabricClient::connect(&url).await.unwrap();

        let err = FileTransferClient::new(&conn)
            .with_service_id("beta")
            .store_file_from_stream(&b"abc"[..], "abc.txt", Some(3), None)
            .await
            .unwrap_err();
        assert_eq!(service_code(&err), 404);
        assert!(!storage.path().join("abc.txt").exists());
        server.shutdown();
    }

    #[tokio::test]
    async fn skipped_segment_fails_and_leaves_nothing_behind() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), None).await;
        let conn = Tampering {
            inner: FabricClient::connect(&url).await.unwrap(),
            rewrite: |f: &mut BTreeMap<String, String>| {
                if f.get(fields::SEGMENT_NUMBER).map(String::as_str) == Some("2") {
                    f.insert(fields::SEGMENT_NUMBER.into(), "3".into());
                }
            },
        };

        let data = content(3000);
        let err = FileTransferClient::new(&conn)
            .with_max_segment_size(1000)
            .store_file_from_stream(&data[..], "skipped.bin", Some(3000), None)
            .await
            .unwrap_err();

        assert_eq!(service_code(&err), 400);
        assert!(err.to_string().contains("expected 2, received 3"));
        assert!(!storage.path().join("skipped.bin").exists());
        assert_eq!(working_dir_entries(storage.path()), 0);
        assert!(server.handler().manager().active_transfers().is_empty());
        server.shutdown();
    }

    #[tokio::test]
    async fn declared_size_mismatch_never_publishes() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), None).await;
        let conn = Tampering {
            inner: FabricClient::connect(&url).await.unwrap(),
            rewrite: |f: &mut BTreeMap<String, String>| {
                if f.contains_key(fields::SIZE) {
                    f.insert(fields::SIZE.into(), "9999".into());
                }
            },
        };

        let data = content(1500);
        let err = FileTransferClient::new(&conn)
            .store_file_from_stream(&data[..], "sized.bin", Some(1500), None)
            .await
            .unwrap_err();

        assert_eq!(service_code(&err), 400);
        assert!(err.to_string().contains("unexpected file size"));
        assert!(!storage.path().join("sized.bin").exists());
        assert_eq!(working_dir_entries(storage.path()), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn escaping_names_are_rejected() {
        let storage = TempDir::new().unwrap();
        let conn = LocalFabric::new(storage.path());
        let client = FileTransferClient::new(&conn);

        for name in ["../../etc/passwd", ".workdir", ".workdir/inside.bin", ""] {
            let err = client
                .store_file_from_stream(&b"payload"[..], name, Some(7), None)
                .await
                .unwrap_err();
            assert_eq!(service_code(&err), 400, "name {name:?}");
        }

        assert!(conn.service.manager().active_transfers().is_empty());
        assert_eq!(working_dir_entries(storage.path()), 0);
    }

    #[tokio::test]
    async fn cancel_mid_transfer_discards_work() {
        let storage = TempDir::new().unwrap();
        let conn = LocalFabric::new(storage.path());

        let first = conn
            .raw(&[(fields::NAME, "big.bin"), (fields::SEGMENT_NUMBER, "1")], b"part one")
            .await;
        let id = first.parse_payload::<SegmentResponse>().unwrap().unwrap().file_id;
        assert!(storage.path().join(".workdir").join(&id).is_dir());

        let cancel = conn
            .raw(&[(fields::FILE_ID, &id), (fields::RESULT, "cancel")], b"")
            .await;
        let resp: SegmentResponse = cancel.parse_payload().unwrap().unwrap();
        assert_eq!(resp.file_id, id);

        assert!(!storage.path().join(".workdir").join(&id).exists());
        assert!(!storage.path().join("big.bin").exists());
        assert!(conn.service.manager().active_transfers().is_empty());

        // A late segment for the discarded id is refused.
        let late = conn
            .raw(&[(fields::FILE_ID, &id), (fields::SEGMENT_NUMBER, "2")], b"part two")
            .await;
        assert_eq!(late.error.unwrap().code, 400);
    }

    #[tokio::test]
    async fn cancel_token_stops_sender_and_cancels_receiver() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), None).await;
        let conn = FabricClient::connect(&url).await.unwrap();

        let client = FileTransferClient::new(&conn).with_max_segment_size(100);
        let token = client.cancel_token();
        let observer = move |_: &SegmentProgress| token.cancel();

        let data = content(1000);
        let err = client
            .store_file_from_stream(&data[..], "stopped.bin", Some(1000), Some(&observer))
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Cancelled));
        assert!(!storage.path().join("stopped.bin").exists());
        assert_eq!(working_dir_entries(storage.path()), 0);
        assert!(server.handler().manager().active_transfers().is_empty());
        server.shutdown();
    }

    #[tokio::test]
    async fn restart_purges_stale_transfers() {
        let storage = TempDir::new().unwrap();
        let stale = storage.path().join(".workdir").join("crashed-transfer");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("file"), b"half written").unwrap();

        let conn = LocalFabric::new(storage.path());
        assert!(!stale.exists());
        assert_eq!(working_dir_entries(storage.path()), 0);

        let client = FileTransferClient::new(&conn);
        client
            .store_file_from_stream(&b"fresh"[..], "fresh.txt", Some(5), None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(storage.path().join("fresh.txt")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn caller_chosen_id_cannot_start_twice() {
        let storage = TempDir::new().unwrap();
        let conn = LocalFabric::new(storage.path());

        let pairs = [
            (fields::FILE_ID, "my-upload"),
            (fields::NAME, "one.bin"),
            (fields::SEGMENT_NUMBER, "1"),
        ];
        let first = conn.raw(&pairs, b"a").await;
        assert!(first.error.is_none());

        let second = conn.raw(&pairs, b"b").await;
        let err = second.error.unwrap();
        assert_eq!(err.code, 400);
        assert!(err.message.contains("already exists"));
        assert_eq!(
            conn.service.manager().active_transfers(),
            vec!["my-upload".to_string()]
        );
    }

    #[tokio::test]
    async fn concurrent_clients_store_independently() {
        let storage = TempDir::new().unwrap();
        let (server, url) = start_service(storage.path(), None).await;

        let mut tasks = Vec::new();
        for n in 0..4usize {
            let url = url.clone();
            tasks.push(tokio::spawn(async move {
                let conn = FabricClient::connect(&url).await.unwrap();
                let data = content(4000 + n);
                FileTransferClient::new(&conn)
                    .with_max_segment_size(512)
                    .store_file_from_stream(&data[..], &format!("peer-{n}.bin"), Some(data.len() as u64), None)
                    .await
                    .unwrap();
                data
            }));
        }

        for (n, task) in tasks.into_iter().enumerate() {
            let data = task.await.unwrap();
            assert_eq!(
                std::fs::read(storage.path().join(format!("peer-{n}.bin"))).unwrap(),
                data
            );
        }
        assert_eq!(working_dir_entries(storage.path()), 0);
        server.shutdown();
    }
}
