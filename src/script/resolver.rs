use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use url::Url;

use super::{without_credentials, CommandReference, ResolveError, ResolvedScript};
use crate::error::Result;
use crate::execution::ExecutionId;

/// Turns a [`CommandReference`] into a script path.
///
/// File references resolve without touching the disk or the network.
/// HTTP(S) references are fetched once, with no retry, into a uniquely
/// named `<execution id>-*.sh` file under the script directory.
#[derive(Debug, Clone)]
pub struct ScriptResolver {
    client: reqwest::Client,
    script_dir: PathBuf,
}

impl ScriptResolver {
    pub fn new(script_dir: impl Into<PathBuf>, fetch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            client,
            script_dir: script_dir.into(),
        })
    }

    pub async fn resolve(
        &self,
        reference: &CommandReference,
        execution_id: &ExecutionId,
    ) -> std::result::Result<ResolvedScript, ResolveError> {
        match reference {
            CommandReference::File(path) => Ok(ResolvedScript::Local(path.clone())),
            CommandReference::Http(url) | CommandReference::Https(url) => {
                self.fetch(url, execution_id).await
            }
            CommandReference::Unsupported(scheme) => {
                Err(ResolveError::UnsupportedScheme(scheme.clone()))
            }
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        execution_id: &ExecutionId,
    ) -> std::result::Result<ResolvedScript, ResolveError> {
        tracing::info!(
            execution_id = %execution_id,
            url = %without_credentials(url),
            "Fetching script"
        );

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::FetchFailed(error_chain(&e)))?;

        tokio::fs::create_dir_all(&self.script_dir)
            .await
            .map_err(ResolveError::StorageFailed)?;

        let (file, path) = tempfile::Builder::new()
            .prefix(&format!("{}-", execution_id))
            .suffix(".sh")
            .tempfile_in(&self.script_dir)
            .map_err(ResolveError::StorageFailed)?
            .into_parts();

        // `path` deletes the file if anything below fails.
        let mut out = tokio::fs::File::from_std(file);
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ResolveError::FetchFailed(error_chain(&e)))?
        {
            out.write_all(&chunk)
                .await
                .map_err(ResolveError::StorageFailed)?;
            written += chunk.len();
        }
        out.flush().await.map_err(ResolveError::StorageFailed)?;
        drop(out);

        tracing::debug!(
            execution_id = %execution_id,
            path = %path.display(),
            bytes = written,
            "Script fetched"
        );

        Ok(ResolvedScript::Fetched(path))
    }
}

/// Render an error with its full `source()` chain, e.g.
/// `error sending request: operation timed out`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionIdAllocator;
    use std::path::Path;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "request failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn error_chain_includes_causes() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "operation timed out",
        ));
        assert_eq!(error_chain(&err), "request failed: operation timed out");
    }

    #[tokio::test]
    async fn file_reference_resolves_to_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ScriptResolver::new(dir.path(), Duration::from_secs(1)).unwrap();
        let id = ExecutionIdAllocator::new().allocate();

        let reference = CommandReference::File(PathBuf::from("/does/not/exist.sh"));
        let script = resolver.resolve(&reference, &id).await.unwrap();

        assert_eq!(script.path(), Path::new("/does/not/exist.sh"));
        assert!(!script.is_fetched());
    }

    #[tokio::test]
    async fn unsupported_scheme_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let script_dir = dir.path().join("scripts");
        let resolver = ScriptResolver::new(&script_dir, Duration::from_secs(1)).unwrap();
        let id = ExecutionIdAllocator::new().allocate();

        let reference = CommandReference::Unsupported("ftp".to_string());
        let err = resolver.resolve(&reference, &id).await.unwrap_err();

        assert!(matches!(err, ResolveError::UnsupportedScheme(ref s) if s == "ftp"));
        assert!(!script_dir.exists());
    }
}
