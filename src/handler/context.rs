//! Per-request workspace.

use std::io;
use std::path::Path;

use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "reelgrab-";

/// State owned by one request: the source link and a private temporary
/// directory holding every file the request creates. The directory is
/// removed when the context is closed or dropped, including while a panic
/// unwinds.
#[derive(Debug)]
pub struct RequestContext {
    pub url: String,
    workspace: TempDir,
}

impl RequestContext {
    /// Create a fresh workspace under `parent`, or the system temp dir.
    pub fn create(url: impl Into<String>, parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let workspace = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self {
            url: url.into(),
            workspace,
        })
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Remove the workspace now, reporting failures instead of ignoring them.
    pub fn close(self) -> io::Result<()> {
        self.workspace.close()
    }
}
