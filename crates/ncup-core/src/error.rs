//! Error types for the reconciliation engine.
//!
//! Per-artifact failures ([`VerifyError`]) are isolated by the merger and
//! never abort a track. Everything wrapped by [`TrackError`] aborts the
//! affected track without writing its state file.

use std::path::PathBuf;

use ncup_schema::{CoreVersion, DigestError, SchemaError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
}

/// Failures of the content-addressing helper.
#[derive(Error, Debug)]
pub enum AddressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: &'static str, secs: u64 },

    #[error("{program} printed an unusable digest: {source}")]
    InvalidDigest {
        program: &'static str,
        #[source]
        source: DigestError,
    },

    #[error("Invalid helper arguments: {0}")]
    Arguments(#[from] serde_json::Error),
}

/// Per-artifact provenance failures.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Content addressing failed: {0}")]
    Address(#[from] AddressError),

    #[error("Certificate rejected by trust store: {0}")]
    CertificateChain(String),

    #[error("Invalid distributor certificate: {0}")]
    InvalidCertificate(#[source] openssl::error::ErrorStack),

    #[error("Signature does not match the downloaded artifact")]
    SignatureMismatch,

    #[error("Signature is not valid base64: {0}")]
    InvalidSignatureEncoding(#[from] base64::DecodeError),

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Checksum file {0} is empty or malformed")]
    MissingChecksum(String),

    #[error("Cannot derive a file name from {0}")]
    UnusableFilename(String),
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Update server request failed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("App index request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("App index is not a JSON array: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TrustStoreError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid trust material: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

/// Failures reading the shipped-app metadata of a realised core tree.
#[derive(Error, Debug)]
pub enum ShippedError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed {path}: {reason}")]
    Xml { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("GitHub request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unexpected GitHub response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prefetch failed: {0}")]
    Address(#[from] AddressError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid state file {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
}

/// A failure that aborts one track.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Core {version} failed verification: {source}")]
    CoreVerification {
        version: CoreVersion,
        #[source]
        source: VerifyError,
    },

    #[error("No verified core release is known yet")]
    MissingCoreArtifact,

    #[error("Failed to realise core release: {0}")]
    Realize(#[source] AddressError),

    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Shipped(#[from] ShippedError),
}
