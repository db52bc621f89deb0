//! Command references and their resolution into runnable scripts.
//!
//! A run request carries a URI-shaped command reference. Its scheme decides
//! where the script comes from:
//!
//! | Scheme            | Source                                          |
//! |-------------------|-------------------------------------------------|
//! | `file`            | the URI path, used as-is                        |
//! | `http` / `https`  | fetched into a temporary file in the script dir |
//! | anything else     | rejected with [`ResolveError::UnsupportedScheme`] |

pub mod resolver;

use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use url::Url;

pub use resolver::ScriptResolver;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("malformed command reference: {0}")]
    Malformed(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to fetch script: {0}")]
    FetchFailed(String),

    #[error("failed to store fetched script: {0}")]
    StorageFailed(#[source] std::io::Error),
}

/// Parsed run-request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReference {
    File(PathBuf),
    Http(Url),
    Https(Url),
    Unsupported(String),
}

impl CommandReference {
    /// Parse a raw request payload. Payloads that are not UTF-8 or not a URI
    /// are malformed; a well-formed URI with an unknown scheme is not.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ResolveError> {
        let raw = std::str::from_utf8(payload)
            .map_err(|e| ResolveError::Malformed(format!("payload is not UTF-8: {}", e)))?;
        Self::parse(raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let url = Url::parse(raw).map_err(|e| ResolveError::Malformed(format!("{}: {:?}", e, raw)))?;

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(CommandReference::File)
                .map_err(|_| ResolveError::Malformed(format!("not a local file path: {:?}", raw))),
            "http" => Ok(CommandReference::Http(url)),
            "https" => Ok(CommandReference::Https(url)),
            other => Ok(CommandReference::Unsupported(other.to_string())),
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            CommandReference::File(_) => "file",
            CommandReference::Http(_) => "http",
            CommandReference::Https(_) => "https",
            CommandReference::Unsupported(scheme) => scheme,
        }
    }
}

/// Log-safe rendering: URL credentials are never shown.
impl fmt::Display for CommandReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandReference::File(path) => write!(f, "file://{}", path.display()),
            CommandReference::Http(url) | CommandReference::Https(url) => {
                write!(f, "{}", without_credentials(url))
            }
            CommandReference::Unsupported(scheme) => write!(f, "{}:", scheme),
        }
    }
}

pub(crate) fn without_credentials(url: &Url) -> Url {
    let mut url = url.clone();
    // Only fails for cannot-be-a-base URLs, which carry no credentials.
    let _ = url.set_password(None);
    let _ = url.set_username("");
    url
}

/// A script ready to hand to the shell.
///
/// Fetched scripts own their temporary file; it is removed when the value
/// is dropped.
#[derive(Debug)]
pub enum ResolvedScript {
    Local(PathBuf),
    Fetched(TempPath),
}

impl ResolvedScript {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedScript::Local(path) => path.as_path(),
            ResolvedScript::Fetched(path) => &**path,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, ResolvedScript::Fetched(_))
    }
}
