
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mqworker::worker::{OutputSink, RunError, ScriptExecutor};
use test_harness::write_script;

/// Collects chunks with their arrival time.
#[derive(Default)]
struct CollectingSink {
    chunks: Mutex<Vec<(Instant, Vec<u8>)>>,
}

impl CollectingSink {
    fn text(&self) -> String {
        let chunks = self.chunks.lock().unwrap();
        let bytes: Vec<u8> = chunks.iter().flat_map(|(_, c)| c.clone()).collect();
        String::from_utf8(bytes).unwrap()
    }

    fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }
}

#[async_trait]
impl OutputSink for CollectingSink {
    async fn write(&self, chunk: &[u8]) {
        self.chunks
            .lock()
            .unwrap()
            .push((Instant::now(), chunk.to_vec()));
    }
}

async fn run_script(body: &str) -> (Result<(), RunError>, CollectingSink, CollectingSink) {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "job.sh", body);
    let stdout = CollectingSink::default();
    let stderr = CollectingSink::default();

    let result = ScriptExecutor::new().run(&script, &stdout, &stderr).await;
    (result, stdout, stderr)
}

#[tokio::test]
async fn test_run_simple_script() {
    let (result, stdout, stderr) = run_script("echo hello\n").await;

    assert!(result.is_ok());
    assert_eq!(stdout.text(), "hello\n");
    assert_eq!(stderr.chunk_count(), 0);
}

#[tokio::test]
async fn test_run_empty_script() {
    let (result, stdout, stderr) = run_script("").await;

    assert!(result.is_ok());
    assert_eq!(stdout.chunk_count(), 0);
    assert_eq!(stderr.chunk_count(), 0);
}

#[tokio::test]
async fn test_run_large_output() {
    let (result, stdout, _stderr) = run_script("seq 1 1000\n").await;

    assert!(result.is_ok());
    let output = stdout.text();
    assert_eq!(output.lines().count(), 1000);
    assert_eq!(output.lines().last(), Some("1000"));
}

#[tokio::test]
async fn test_run_streams_stdout_and_stderr_separately() {
    let (result, stdout, stderr) = run_script("echo out\necho err >&2\necho more\n").await;

    assert!(result.is_ok());
    assert_eq!(stdout.text(), "out\nmore\n");
    assert_eq!(stderr.text(), "err\n");
}

#[tokio::test]
async fn test_run_nonzero_exit() {
    let (result, _stdout, stderr) = run_script("echo 'error message' >&2\nexit 3\n").await;

    match result {
        Err(RunError::ExitFailed(detail)) => assert!(detail.contains("3"), "detail: {}", detail),
        other => panic!("expected ExitFailed, got {:?}", other),
    }
    // Output produced before the failure is still forwarded.
    assert_eq!(stderr.text(), "error message\n");
}

#[tokio::test]
async fn test_run_killed_by_signal() {
    let (result, _stdout, _stderr) = run_script("kill -9 $$\n").await;

    match result {
        Err(RunError::ExitFailed(detail)) => {
            assert!(detail.contains("signal"), "detail: {}", detail)
        }
        other => panic!("expected ExitFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_missing_script_fails_after_start() {
    let stdout = CollectingSink::default();
    let stderr = CollectingSink::default();

    let result = ScriptExecutor::new()
        .run(
            std::path::Path::new("/nonexistent/script_12345.sh"),
            &stdout,
            &stderr,
        )
        .await;

    assert!(matches!(result, Err(RunError::ExitFailed(_))));
    // The shell itself reports the missing file on stderr.
    assert!(stderr.chunk_count() > 0);
}

#[tokio::test]
async fn test_run_start_failure_touches_no_sink() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "job.sh", "echo never\n");
    let stdout = CollectingSink::default();
    let stderr = CollectingSink::default();

    let result = ScriptExecutor::with_shell("/nonexistent/shell_12345")
        .run(&script, &stdout, &stderr)
        .await;

    assert!(matches!(result, Err(RunError::StartFailed(_))));
    assert_eq!(stdout.chunk_count(), 0);
    assert_eq!(stderr.chunk_count(), 0);
}

#[tokio::test]
async fn test_run_forwards_output_while_running() {
    let started = Instant::now();
    let (result, stdout, _stderr) = run_script("echo first\nsleep 1\necho second\n").await;
    let finished = Instant::now();

    assert!(result.is_ok());
    assert_eq!(stdout.text(), "first\nsecond\n");

    let chunks = stdout.chunks.lock().unwrap();
    assert!(chunks.len() >= 2, "expected separate chunks, got {}", chunks.len());
    let (first_at, first) = &chunks[0];
    assert_eq!(first, b"first\n");
    // The first line arrived well before the script finished sleeping.
    assert!(finished.duration_since(*first_at) >= Duration::from_millis(500));
    assert!(first_at.duration_since(started) < Duration::from_millis(900));
}

#[tokio::test]
async fn test_run_passes_script_path_as_argument() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "whoami.sh", "echo \"$0\"\n");
    let stdout = CollectingSink::default();
    let stderr = CollectingSink::default();

    let result = ScriptExecutor::new().run(&script, &stdout, &stderr).await;

    assert!(result.is_ok());
    assert_eq!(stdout.text().trim(), script.display().to_string());
}
