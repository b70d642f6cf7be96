use super::{AttemptOutcome, DownloadEngine};
use crate::config::Config;
use crate::error::{DownloadError, Error};
use crate::store::{JobStore, MemoryJobStore};
use crate::types::{Job, JobId, JobStatus, NewJob};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// JobStore wrapper that records every status update, for asserting on the
/// persisted progress sequence.
#[derive(Clone)]
struct RecordingStore {
    inner: MemoryJobStore,
    updates: Arc<tokio::sync::Mutex<Vec<(JobStatus, i32)>>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: MemoryJobStore::new(),
            updates: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    async fn updates(&self) -> Vec<(JobStatus, i32)> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, new_job: NewJob) -> crate::Result<JobId> {
        self.inner.create(new_job).await
    }

    async fn get(&self, id: JobId) -> crate::Result<Option<Job>> {
        self.inner.get(id).await
    }

    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: i32,
    ) -> crate::Result<()> {
        self.updates.lock().await.push((status, progress));
        self.inner.update_status(id, status, progress).await
    }

    async fn set_content_length(&self, id: JobId, content_length: i64) -> crate::Result<()> {
        self.inner.set_content_length(id, content_length).await
    }

    async fn list(&self) -> crate::Result<Vec<Job>> {
        self.inner.list().await
    }
}

struct TestRig {
    engine: DownloadEngine,
    store: Arc<RecordingStore>,
    _temp_dir: tempfile::TempDir,
}

fn test_rig() -> TestRig {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        staging_dir: temp_dir.path().join("staging"),
        final_dir: temp_dir.path().join("final"),
        ..Default::default()
    };
    let store = Arc::new(RecordingStore::new());
    let engine = DownloadEngine::new(&config, store.clone() as Arc<dyn JobStore>).unwrap();
    TestRig {
        engine,
        store,
        _temp_dir: temp_dir,
    }
}

async fn make_job(store: &RecordingStore, filename: &str, url: &str) -> Job {
    let id = store
        .create(NewJob {
            filename: filename.to_string(),
            url: url.to_string(),
        })
        .await
        .unwrap();
    store.get(id).await.unwrap().unwrap()
}

// --- idempotent short-circuit ---

#[tokio::test]
async fn test_existing_final_artifact_skips_network_entirely() {
    let rig = test_rig();
    let server = MockServer::start().await;

    // Any request at all fails the test.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;

    tokio::fs::create_dir_all(rig.engine.final_path("a.bin").parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(rig.engine.final_path("a.bin"), b"already here")
        .await
        .unwrap();

    let outcome = rig.engine.download(&job).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::AlreadyCompleted);

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
}

// --- full transfer, concrete 1000-byte scenario ---

#[tokio::test]
async fn test_full_download_promotes_artifact_and_completes() {
    let rig = test_rig();
    let server = MockServer::start().await;
    let body = vec![b'a'; 1000];

    Mock::given(method("GET"))
        .and(path("/a.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;
    let outcome = rig.engine.download(&job).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Completed);

    let final_bytes = tokio::fs::read(rig.engine.final_path("a.bin")).await.unwrap();
    assert_eq!(final_bytes.len(), 1000, "final artifact size must equal total");
    assert!(
        tokio::fs::metadata(rig.engine.staging_path("a.bin")).await.is_err(),
        "staging artifact must be gone after promotion"
    );

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.content_length, Some(1000));
}

#[tokio::test]
async fn test_persisted_progress_is_monotone_and_step_spaced() {
    let rig = test_rig();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 1000]))
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;
    rig.engine.download(&job).await.unwrap();

    let updates = rig.store.updates().await;
    let progress_values: Vec<i32> = updates
        .iter()
        .filter(|(status, _)| *status == JobStatus::Downloading)
        .map(|(_, p)| *p)
        .collect();

    assert!(
        progress_values.windows(2).all(|w| w[0] <= w[1]),
        "persisted progress must be non-decreasing: {:?}",
        progress_values
    );
    // Skip the initial downloading/0 marker when checking the step floor.
    assert!(
        progress_values
            .iter()
            .skip(1)
            .zip(progress_values.iter().skip(2))
            .all(|(a, b)| b - a >= 5 || *b == 100),
        "non-terminal updates must be at least 5 points apart: {:?}",
        progress_values
    );
    assert_eq!(
        updates.last().copied(),
        Some((JobStatus::Completed, 100)),
        "terminal update must be completed/100"
    );
}

// --- resume ---

#[tokio::test]
async fn test_resume_from_staging_offset_writes_remaining_bytes() {
    let rig = test_rig();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a.bin"))
        .and(header("Range", "bytes=400-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 400-999/1000")
                .set_body_bytes(vec![b'b'; 600]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;

    tokio::fs::create_dir_all(rig.engine.staging_path("a.bin").parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(rig.engine.staging_path("a.bin"), vec![b'a'; 400])
        .await
        .unwrap();

    let outcome = rig.engine.download(&job).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Completed);

    let final_bytes = tokio::fs::read(rig.engine.final_path("a.bin")).await.unwrap();
    assert_eq!(final_bytes.len(), 1000);
    assert!(
        final_bytes[..400].iter().all(|&b| b == b'a'),
        "resumed transfer must preserve the original staging prefix"
    );
    assert!(final_bytes[400..].iter().all(|&b| b == b'b'));

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.content_length, Some(1000), "total from Content-Range");
}

#[tokio::test]
async fn test_resume_rejected_when_server_ignores_range() {
    let rig = test_rig();
    let server = MockServer::start().await;

    // Server answers 200 instead of 206 on a ranged request.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 1000]))
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;
    tokio::fs::create_dir_all(rig.engine.staging_path("a.bin").parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(rig.engine.staging_path("a.bin"), vec![b'a'; 400])
        .await
        .unwrap();

    let result = rig.engine.download(&job).await;
    match result {
        Err(Error::Download(DownloadError::ResumeUnsupported { status })) => {
            assert_eq!(status, 200)
        }
        other => panic!("expected ResumeUnsupported, got: {:?}", other),
    }

    let staging = tokio::fs::metadata(rig.engine.staging_path("a.bin"))
        .await
        .unwrap();
    assert_eq!(
        staging.len(),
        400,
        "nothing may be written past the existing staging size"
    );

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

// --- response validation ---

#[tokio::test]
async fn test_error_status_fails_without_writing_staging() {
    let rig = test_rig();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;
    let result = rig.engine.download(&job).await;

    match result {
        Err(Error::Download(DownloadError::HttpStatus { status })) => assert_eq!(status, 404),
        other => panic!("expected HttpStatus, got: {:?}", other),
    }
    assert!(
        tokio::fs::metadata(rig.engine.staging_path("a.bin")).await.is_err(),
        "an error body must never reach the staging artifact"
    );
}

#[tokio::test]
async fn test_short_stream_is_an_incomplete_transfer() {
    let rig = test_rig();
    let server = MockServer::start().await;

    // Content-Range promises 1000 bytes, body delivers 400.
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 0-999/1000")
                .set_body_bytes(vec![b'a'; 400]),
        )
        .mount(&server)
        .await;

    let job = make_job(&rig.store, "a.bin", &format!("{}/a.bin", server.uri())).await;
    let result = rig.engine.download(&job).await;

    match result {
        Err(Error::Download(DownloadError::IncompleteTransfer { expected, received })) => {
            assert_eq!(expected, 1000);
            assert_eq!(received, 400);
        }
        other => panic!("expected IncompleteTransfer, got: {:?}", other),
    }

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        tokio::fs::metadata(rig.engine.final_path("a.bin")).await.is_err(),
        "incomplete artifact must not be promoted"
    );
}

// --- transport-level retry ---

/// Spawns a raw TCP fixture: the first `failures` connections are accepted
/// and dropped before any response; later connections get a minimal HTTP
/// response carrying `body`. Returns the URL and the connection counter.
async fn flaky_http_fixture(failures: usize, body: &'static [u8]) -> (String, Arc<AtomicUsize>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                // Close before responding: a transport failure, not an
                // HTTP error status.
                drop(socket);
                continue;
            }

            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/a.bin", addr), connections)
}

#[tokio::test]
async fn test_transport_failure_then_success_completes() {
    let rig = test_rig();
    let (url, connections) = flaky_http_fixture(1, b"hello").await;

    let job = make_job(&rig.store, "a.bin", &url).await;
    let outcome = rig.engine.download(&job).await.unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(
        connections.load(Ordering::SeqCst),
        2,
        "one failed attempt plus one successful retry"
    );

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        tokio::fs::read(rig.engine.final_path("a.bin")).await.unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn test_transport_retry_ceiling_is_five_attempts() {
    let rig = test_rig();
    let (url, connections) = flaky_http_fixture(usize::MAX, b"").await;

    let job = make_job(&rig.store, "a.bin", &url).await;
    let result = rig.engine.download(&job).await;

    match result {
        Err(Error::Download(DownloadError::Transport { attempts, .. })) => {
            assert_eq!(attempts, 5)
        }
        other => panic!("expected Transport error, got: {:?}", other),
    }
    assert_eq!(
        connections.load(Ordering::SeqCst),
        5,
        "exactly five connection attempts must be made"
    );

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

// --- unknown total length ---

#[tokio::test]
async fn test_unknown_total_completes_at_stream_end() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let rig = test_rig();

    // No Content-Length and no Content-Range: the body runs until the
    // connection closes, and that close counts as completion.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 2048];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
            .await;
        let _ = socket.write_all(&[b'u'; 700]).await;
        let _ = socket.shutdown().await;
    });

    let job = make_job(&rig.store, "a.bin", &format!("http://{}/a.bin", addr)).await;
    let outcome = rig.engine.download(&job).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Completed);

    let final_bytes = tokio::fs::read(rig.engine.final_path("a.bin")).await.unwrap();
    assert_eq!(final_bytes.len(), 700);

    let job = rig.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.content_length.is_none(), "no total was ever learned");

    // With an unknown total, nothing between the initial downloading/0 and
    // the terminal completed/100 is persisted.
    let intermediate: Vec<i32> = rig
        .store
        .updates()
        .await
        .iter()
        .filter(|(status, p)| *status == JobStatus::Downloading && *p > 0)
        .map(|(_, p)| *p)
        .collect();
    assert!(
        intermediate.is_empty(),
        "unbounded transfers persist no intermediate progress: {:?}",
        intermediate
    );
}

// --- short writes ---

/// AsyncWrite fake that accepts at most `cap` bytes per write call.
struct TruncatingSink {
    cap: usize,
}

impl tokio::io::AsyncWrite for TruncatingSink {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::task::Poll::Ready(Ok(buf.len().min(self.cap)))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_short_write_aborts_with_classification() {
    let mut sink = TruncatingSink { cap: 16 };

    let result = super::append_chunk(&mut sink, &[0u8; 64]).await;
    match result {
        Err(Error::Download(DownloadError::ShortWrite { expected, written })) => {
            assert_eq!(expected, 64);
            assert_eq!(written, 16);
        }
        other => panic!("expected ShortWrite, got: {:?}", other),
    }

    // A chunk the sink fully accepts passes through untouched.
    let written = super::append_chunk(&mut sink, &[0u8; 8]).await.unwrap();
    assert_eq!(written, 8);
}

// --- header parsing ---

#[test]
fn test_content_range_total_parsing() {
    assert_eq!(super::content_range_total("bytes 400-999/1000"), Some(1000));
    assert_eq!(super::content_range_total("bytes 0-0/1"), Some(1));
    assert_eq!(
        super::content_range_total("bytes 0-499/*"),
        None,
        "unknown total form must yield None"
    );
    assert_eq!(super::content_range_total("garbage"), None);
    assert_eq!(super::content_range_total(""), None);
}
