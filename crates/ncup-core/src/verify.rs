//! Provenance verification.
//!
//! Apps are trusted through their publisher's signature: the distributor
//! certificate is validated against the core's bundled code-signing root and
//! revocation list, and the archive is checked against a SHA-512 RSA
//! signature. A chain failure is logged but does not reject the artifact on
//! its own; the signature check still decides.
//!
//! The core release is trusted through the checksum file published next to
//! it. Any mismatch there is fatal for the track.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ncup_schema::{AppId, ContentHash, Sha256Digest, SignatureInfo};
use openssl::hash::MessageDigest;
use openssl::sign::Verifier;
use openssl::ssl::SslFiletype;
use openssl::stack::Stack;
use openssl::x509::store::{X509Lookup, X509Store, X509StoreBuilder};
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{X509, X509StoreContext};
use tracing::{debug, warn};

use crate::error::{TrustStoreError, VerifyError};
use crate::io::{ContentAddresser, Fetcher};
use crate::paths::filename_from_url;

/// Code-signing root certificates, relative to the realised core tree.
pub const ROOT_CERTIFICATES: &str = "resources/codesigning/root.crt";
/// Code-signing revocation list, relative to the realised core tree.
pub const ROOT_CRL: &str = "resources/codesigning/root.crl";

/// Certificate store for validating app distributor certificates.
pub struct TrustStore {
    store: X509Store,
}

impl fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustStore").finish_non_exhaustive()
    }
}

impl TrustStore {
    /// Load the code-signing root and revocation list bundled with a core
    /// release, with revocation checking enabled.
    pub fn load(core_root: &Path) -> Result<Self, TrustStoreError> {
        let cert_path = core_root.join(ROOT_CERTIFICATES);
        let pem = std::fs::read(&cert_path).map_err(|source| TrustStoreError::Io {
            path: cert_path.clone(),
            source,
        })?;

        let crl_path = core_root.join(ROOT_CRL);
        if !crl_path.is_file() {
            return Err(TrustStoreError::Io {
                path: crl_path,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        Self::from_pem(&pem, Some(&crl_path))
    }

    /// Build a store from PEM root certificates and an optional PEM
    /// revocation list. Revocation checking is enabled only with a list.
    pub fn from_pem(roots: &[u8], crl: Option<&Path>) -> Result<Self, TrustStoreError> {
        let mut builder = X509StoreBuilder::new()?;
        for cert in X509::stack_from_pem(roots)? {
            builder.add_cert(cert)?;
        }

        if let Some(crl) = crl {
            builder
                .add_lookup(X509Lookup::file())?
                .load_crl_file(crl, SslFiletype::PEM)?;
            builder.set_flags(X509VerifyFlags::CRL_CHECK)?;
        }

        Ok(Self {
            store: builder.build(),
        })
    }

    /// Validate `cert`'s chain (and revocation status) against the store.
    pub fn validate(&self, cert: &X509) -> Result<(), VerifyError> {
        let chain = Stack::new().map_err(VerifyError::InvalidCertificate)?;
        let mut ctx = X509StoreContext::new().map_err(VerifyError::InvalidCertificate)?;

        let failure = ctx
            .init(&self.store, cert, &chain, |c| {
                let ok = c.verify_cert()?;
                Ok((!ok).then(|| c.error()))
            })
            .map_err(VerifyError::InvalidCertificate)?;

        match failure {
            None => Ok(()),
            Some(reason) => Err(VerifyError::CertificateChain(reason.to_string())),
        }
    }
}

/// Check `data` against a base64 SHA-512 RSA signature made with `cert`'s key.
///
/// Whitespace inside the base64 text is ignored.
pub fn verify_signature(cert: &X509, data: &[u8], signature: &str) -> Result<(), VerifyError> {
    let compact: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let signature = BASE64.decode(compact)?;

    let key = cert.public_key().map_err(VerifyError::InvalidCertificate)?;
    let mut verifier =
        Verifier::new(MessageDigest::sha512(), &key).map_err(VerifyError::InvalidCertificate)?;
    verifier
        .update(data)
        .map_err(VerifyError::InvalidCertificate)?;

    match verifier.verify(&signature) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(VerifyError::SignatureMismatch),
    }
}

/// File name to hand to the content-addressing helper for a download URL.
///
/// Takes the last path segment, drops any query string, keeps only ASCII
/// alphanumerics and `.`, `_`, `-`, and strips leading dots.
pub fn sanitized_filename(url: &str) -> Result<String, VerifyError> {
    let last = filename_from_url(url);
    let base = last.rsplit_once('?').map_or(last, |(head, _)| head);

    let name: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let name = name.trim_start_matches('.');

    if name.is_empty() {
        return Err(VerifyError::UnusableFilename(url.to_string()));
    }
    Ok(name.to_string())
}

/// Verifies a signed app artifact and returns its content-address.
#[async_trait]
pub trait ArtifactVerifier: Send + Sync {
    async fn verify(
        &self,
        app: &AppId,
        url: &str,
        signature: &SignatureInfo,
    ) -> Result<ContentHash, VerifyError>;
}

/// Fetches, signature-checks and content-addresses app archives.
pub struct SignedArtifactVerifier {
    fetcher: Arc<dyn Fetcher>,
    addresser: Arc<dyn ContentAddresser>,
    trust: TrustStore,
}

impl fmt::Debug for SignedArtifactVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedArtifactVerifier")
            .field("trust", &self.trust)
            .finish_non_exhaustive()
    }
}

impl SignedArtifactVerifier {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        addresser: Arc<dyn ContentAddresser>,
        trust: TrustStore,
    ) -> Self {
        Self {
            fetcher,
            addresser,
            trust,
        }
    }
}

#[async_trait]
impl ArtifactVerifier for SignedArtifactVerifier {
    async fn verify(
        &self,
        app: &AppId,
        url: &str,
        signature: &SignatureInfo,
    ) -> Result<ContentHash, VerifyError> {
        let cert = X509::from_pem(signature.certificate.as_bytes())
            .map_err(VerifyError::InvalidCertificate)?;

        if let Err(e) = self.trust.validate(&cert) {
            warn!(app = %app, error = %e, "distributor certificate not trusted, relying on signature");
        }

        // Integrity comes from the signature, not the transport.
        let data = self.fetcher.fetch(url, false).await?;
        verify_signature(&cert, &data, &signature.signature)?;

        let filename = sanitized_filename(url)?;
        let hash = self.addresser.address(&filename, &data).await?;
        debug!(app = %app, %hash, "verified");
        Ok(hash)
    }
}

/// Download the core release at `url`, check it against the published
/// `<url>.sha256` file and return its content-address.
pub async fn verify_known_digest(
    fetcher: &dyn Fetcher,
    addresser: &dyn ContentAddresser,
    url: &str,
) -> Result<ContentHash, VerifyError> {
    let filename = filename_from_url(url);
    if filename.is_empty() {
        return Err(VerifyError::UnusableFilename(url.to_string()));
    }

    let checksum_url = format!("{url}.sha256");
    let body = fetcher.fetch(&checksum_url, true).await?;
    let expected = String::from_utf8_lossy(&body)
        .split_whitespace()
        .next()
        .and_then(|token| Sha256Digest::new(token).ok())
        .ok_or_else(|| VerifyError::MissingChecksum(checksum_url.clone()))?;

    let data = fetcher.fetch(url, true).await?;
    let actual = Sha256Digest::compute(&data);
    if actual != expected {
        return Err(VerifyError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok(addresser.address(filename, &data).await?)
}
