//! Snapshot model: apps, themes, the core and the snapshot itself.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::version::{AppVersion, CoreVersion, VersionRange};

/// Unique identifier of an app (e.g. `calendar`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Create a new app identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for AppId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AppId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier of a theme (e.g. `breeze-dark`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeId(String);

impl ThemeId {
    /// Create a new theme identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThemeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ThemeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ThemeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A release track: one major version of the core server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track(u64);

impl Track {
    /// Create a track for the given major version.
    pub fn new(major: u64) -> Self {
        Self(major)
    }

    /// The major version this track follows.
    pub fn major(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distributor certificate and detached signature for an app release.
///
/// Both are exactly as published by the remote index and have not been
/// checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    /// PEM-encoded distributor certificate.
    pub certificate: String,
    /// Base64-encoded signature over the release archive.
    pub signature: String,
}

/// Provenance state of an app artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOrSignature {
    /// Not yet fetched; only the publisher's signature is known.
    Unverified(SignatureInfo),
    /// Fetched, verified and content-addressed.
    Verified(ContentHash),
}

impl HashOrSignature {
    /// The content-address, if the artifact has been verified.
    pub fn verified(&self) -> Option<&ContentHash> {
        match self {
            Self::Verified(hash) => Some(hash),
            Self::Unverified(_) => None,
        }
    }

    /// The signature block, if the artifact is still unverified.
    pub fn signature(&self) -> Option<&SignatureInfo> {
        match self {
            Self::Unverified(sig) => Some(sig),
            Self::Verified(_) => None,
        }
    }
}

impl From<ContentHash> for HashOrSignature {
    fn from(hash: ContentHash) -> Self {
        Self::Verified(hash)
    }
}

/// An app shipped inside the core server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalApp {
    /// Display name.
    pub name: String,
    /// One-line summary.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// License identifiers.
    pub licenses: Vec<String>,
    /// Enabled on a fresh installation. `None` when the source did not say.
    pub enabled_by_default: Option<bool>,
    /// Cannot be disabled. `None` when the source did not say.
    pub always_enabled: Option<bool>,
}

/// An independently released app, generic over its artifact state `H`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalApp<H = ContentHash> {
    /// Display name.
    pub name: String,
    /// Released version.
    pub version: Version,
    /// One-line summary.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Project website, if any.
    pub homepage: Option<String>,
    /// License identifiers.
    pub licenses: Vec<String>,
    /// Download URL of the release archive.
    pub download_url: String,
    /// Verification state of the archive.
    pub artifact: H,
    /// Release notes keyed by version. Not persisted.
    pub changelogs: BTreeMap<Version, String>,
}

impl<H> ExternalApp<H> {
    /// Transform the artifact state, keeping every other field.
    pub fn map_artifact<T>(self, f: impl FnOnce(H) -> T) -> ExternalApp<T> {
        ExternalApp {
            name: self.name,
            version: self.version,
            summary: self.summary,
            description: self.description,
            homepage: self.homepage,
            licenses: self.licenses,
            download_url: self.download_url,
            artifact: f(self.artifact),
            changelogs: self.changelogs,
        }
    }

    /// Replace the artifact state, keeping every other field.
    pub fn with_artifact<T>(self, artifact: T) -> ExternalApp<T> {
        self.map_artifact(|_| artifact)
    }
}

/// An app in a snapshot: shipped with the core, or released on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component<H = ContentHash> {
    /// Shipped with the core server.
    Internal(InternalApp),
    /// Released independently.
    External(ExternalApp<H>),
}

impl<H> Component<H> {
    /// The version the differ compares.
    pub fn version(&self) -> AppVersion {
        match self {
            Self::Internal(_) => AppVersion::Internal,
            Self::External(app) => AppVersion::Release(app.version.clone()),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            Self::Internal(app) => &app.name,
            Self::External(app) => &app.name,
        }
    }

    /// Transform the artifact state of an external app.
    pub fn map_artifact<T>(self, f: impl FnOnce(H) -> T) -> Component<T> {
        match self {
            Self::Internal(app) => Component::Internal(app),
            Self::External(app) => Component::External(app.map_artifact(f)),
        }
    }
}

/// The core server release a snapshot is built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    /// Server version.
    pub version: CoreVersion,
    /// Download URL; absent only in bootstrap state.
    pub download_url: Option<String>,
    /// Content-address of the unpacked release; absent only in bootstrap state.
    pub sha256: Option<ContentHash>,
}

impl Core {
    /// Core state for a track that has never been reconciled.
    pub fn bootstrap(track: Track) -> Self {
        Self {
            version: CoreVersion::from_major(track.major()),
            download_url: None,
            sha256: None,
        }
    }

    /// Download URL and content-address, when both are known.
    pub fn artifact(&self) -> Option<(&str, &ContentHash)> {
        match (&self.download_url, &self.sha256) {
            (Some(url), Some(hash)) => Some((url, hash)),
            _ => None,
        }
    }
}

/// A theme repository on GitHub, pinned to a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSource {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pinned commit.
    pub rev: String,
    /// Content-address of the pinned tree.
    pub sha256: ContentHash,
}

/// Where a theme is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeSource {
    /// A GitHub repository tracked by branch head.
    GitHub(GitHubSource),
}

/// A tracked theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Directory name the theme is installed under.
    pub directory: String,
    /// Pinned upstream.
    pub upstream: ThemeSource,
}

impl Theme {
    /// Revision the theme is pinned to.
    pub fn rev(&self) -> &str {
        match &self.upstream {
            ThemeSource::GitHub(gh) => &gh.rev,
        }
    }
}

/// Optional top-level sections of a state file that were present even
/// though empty. Kept so that a file is written back the way it was read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sections {
    /// `constraints` was present.
    pub constraints: bool,
    /// `themes` was present.
    pub themes: bool,
}

/// Point-in-time state of one release track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSnapshot<H = ContentHash> {
    /// The core server.
    pub core: Core,
    /// Every app offered for this core version.
    pub apps: BTreeMap<AppId, Component<H>>,
    /// Tracked themes.
    pub themes: BTreeMap<ThemeId, Theme>,
    /// Operator pins restricting which releases may be selected.
    pub constraints: BTreeMap<AppId, VersionRange>,
    /// Which optional sections the persisted form carries.
    pub sections: Sections,
}

/// A snapshot whose app artifacts are all verified; the only persistable kind.
pub type Snapshot = ReleaseSnapshot<ContentHash>;

/// A snapshot that may still hold unverified app artifacts.
pub type CandidateSnapshot = ReleaseSnapshot<HashOrSignature>;

impl<H> ReleaseSnapshot<H> {
    /// Version of `app`, if present.
    pub fn app_version(&self, app: &str) -> Option<AppVersion> {
        self.apps.get(app).map(Component::version)
    }
}

impl Snapshot {
    /// Empty state for a track that has never been reconciled.
    pub fn bootstrap(track: Track) -> Self {
        Self {
            core: Core::bootstrap(track),
            apps: BTreeMap::new(),
            themes: BTreeMap::new(),
            constraints: BTreeMap::new(),
            sections: Sections::default(),
        }
    }

    /// Widen into a candidate snapshot (every artifact marked verified).
    pub fn into_candidate(self) -> CandidateSnapshot {
        ReleaseSnapshot {
            core: self.core,
            apps: self
                .apps
                .into_iter()
                .map(|(id, app)| (id, app.into()))
                .collect(),
            themes: self.themes,
            constraints: self.constraints,
            sections: self.sections,
        }
    }
}

impl From<Component<ContentHash>> for Component<HashOrSignature> {
    fn from(component: Component<ContentHash>) -> Self {
        component.map_artifact(HashOrSignature::Verified)
    }
}
