//! Content addressing through the Nix prefetch tools.
//!
//! Every helper invocation is bounded by a timeout; the child process is
//! killed when the timeout fires.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use ncup_schema::ContentHash;
use tokio::process::Command;
use tracing::debug;

use crate::error::AddressError;

const PREFETCH_URL: &str = "nix-prefetch-url";
const BUILD: &str = "nix-build";

const FETCHZIP_EXPR: &str = r"
{ attrs }:

(import <nixpkgs> {}).fetchzip {
  inherit (builtins.fromJSON attrs) url sha256;
}
";

const FETCH_GITHUB_EXPR: &str = r"
{ attrs }: {
  src = (import <nixpkgs> {}).fetchFromGitHub (builtins.fromJSON attrs);
}
";

/// Placeholder hash handed to `fetchFromGitHub` so the prefetcher computes
/// the real one.
const FAKE_HASH: &str = "0000000000000000000000000000000000000000000000000000";

/// Turns artifacts into content-addresses and local trees.
#[async_trait]
pub trait ContentAddresser: Send + Sync {
    /// Content-address of an archive: the digest of its unpacked contents.
    async fn address(&self, filename: &str, data: &[u8]) -> Result<ContentHash, AddressError>;

    /// Fetch and unpack `url`, checking it against `hash`, and return the
    /// local path of the unpacked tree.
    async fn realize(&self, url: &str, hash: &ContentHash) -> Result<PathBuf, AddressError>;

    /// Content-address of a GitHub repository at `rev`.
    async fn prefetch_github(
        &self,
        owner: &str,
        repo: &str,
        rev: &str,
    ) -> Result<ContentHash, AddressError>;
}

#[derive(Debug, Clone)]
pub struct NixPrefetcher {
    timeout: Duration,
}

impl NixPrefetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Run `program` to completion and return its trimmed stdout.
async fn run_helper(
    program: &'static str,
    args: Vec<OsString>,
    timeout: Duration,
) -> Result<String, AddressError> {
    debug!(program, ?args, "running helper");

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| AddressError::Spawn { program, source })?;

    let Ok(output) = tokio::time::timeout(timeout, child.wait_with_output()).await else {
        return Err(AddressError::Timeout {
            program,
            secs: timeout.as_secs(),
        });
    };
    let output = output?;

    if !output.status.success() {
        return Err(AddressError::Failed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn parse_hash(program: &'static str, stdout: &str) -> Result<ContentHash, AddressError> {
    let last = stdout.lines().next_back().unwrap_or("").trim();
    ContentHash::new(last).map_err(|source| AddressError::InvalidDigest { program, source })
}

#[async_trait]
impl ContentAddresser for NixPrefetcher {
    async fn address(&self, filename: &str, data: &[u8]) -> Result<ContentHash, AddressError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(filename);
        tokio::fs::write(&path, data).await?;

        let url = format!("file://{}", path.display());
        let args = vec![
            "--type".into(),
            "sha256".into(),
            "--unpack".into(),
            url.into(),
        ];
        let stdout = run_helper(PREFETCH_URL, args, self.timeout).await?;
        parse_hash(PREFETCH_URL, &stdout)
    }

    async fn realize(&self, url: &str, hash: &ContentHash) -> Result<PathBuf, AddressError> {
        let attrs = serde_json::to_string(&serde_json::json!({
            "url": url,
            "sha256": hash.as_str(),
        }))?;
        let args = vec![
            "--no-out-link".into(),
            "--builders".into(),
            "".into(),
            "-E".into(),
            FETCHZIP_EXPR.into(),
            "--argstr".into(),
            "attrs".into(),
            attrs.into(),
        ];
        let stdout = run_helper(BUILD, args, self.timeout).await?;
        let path = stdout.lines().next_back().unwrap_or("").trim();
        Ok(PathBuf::from(path))
    }

    async fn prefetch_github(
        &self,
        owner: &str,
        repo: &str,
        rev: &str,
    ) -> Result<ContentHash, AddressError> {
        let mut expr = tempfile::Builder::new().suffix(".nix").tempfile()?;
        expr.write_all(FETCH_GITHUB_EXPR.as_bytes())?;
        expr.flush()?;

        let attrs = serde_json::to_string(&serde_json::json!({
            "owner": owner,
            "repo": repo,
            "rev": rev,
            "sha256": FAKE_HASH,
        }))?;
        let args = vec![
            expr.path().as_os_str().to_owned(),
            "--argstr".into(),
            "attrs".into(),
            attrs.into(),
            "-A".into(),
            "src".into(),
        ];
        let stdout = run_helper(PREFETCH_URL, args, self.timeout).await?;
        parse_hash(PREFETCH_URL, &stdout)
    }
}
