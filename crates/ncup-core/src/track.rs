//! Reconciliation of one release track, start to finish.
//!
//! load state -> discover core -> verify and realise core -> resolve apps ->
//! upgrade themes -> diff -> merge -> save
//!
//! Nothing is written for a track until every step has completed.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use ncup_schema::{
    AppId, CandidateSnapshot, Component, Core, ExternalApp, HashOrSignature, InternalApp,
    ReleaseSnapshot, Snapshot, Theme, ThemeId, Track,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::diff::ReleaseDiff;
use crate::discovery::discover_core;
use crate::error::TrackError;
use crate::index::{fetch_index, resolve_apps};
use crate::io::{ContentAddresser, Fetcher, HttpFetcher, NixPrefetcher};
use crate::merge::{AppOutcome, merge};
use crate::paths::state_file;
use crate::report::TrackReport;
use crate::shipped::shipped_apps;
use crate::store;
use crate::themes::{BranchHeads, GitHubApi, upgrade_themes};
use crate::verify::{ArtifactVerifier, SignedArtifactVerifier, TrustStore, verify_known_digest};

/// External collaborators used by the pipeline.
#[derive(Clone)]
pub struct Services {
    pub fetcher: Arc<dyn Fetcher>,
    pub addresser: Arc<dyn ContentAddresser>,
    pub heads: Arc<dyn BranchHeads>,
}

impl Services {
    /// HTTP, GitHub and nix helpers configured from `config`.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self {
            fetcher: Arc::new(HttpFetcher::from_config(config)?),
            addresser: Arc::new(NixPrefetcher::new(config.helper_timeout())),
            heads: Arc::new(GitHubApi::from_config(config)?),
        })
    }
}

/// Result of reconciling one track.
#[derive(Debug)]
pub struct Reconciled {
    pub report: TrackReport,
    /// The snapshot to persist, if anything changed.
    pub snapshot: Option<Snapshot>,
    pub outcomes: BTreeMap<AppId, AppOutcome>,
}

impl Reconciled {
    fn unchanged(track: Track) -> Self {
        Self {
            report: TrackReport::empty(track),
            snapshot: None,
            outcomes: BTreeMap::new(),
        }
    }
}

/// Assemble a candidate snapshot. Shipped apps take precedence over
/// indexed apps of the same id; pins carry over from `old`.
pub fn build_candidate(
    old: &Snapshot,
    core: Core,
    external: BTreeMap<AppId, ExternalApp<HashOrSignature>>,
    internal: BTreeMap<AppId, InternalApp>,
    themes: BTreeMap<ThemeId, Theme>,
) -> CandidateSnapshot {
    let mut apps: BTreeMap<AppId, Component<HashOrSignature>> = external
        .into_iter()
        .map(|(id, app)| (id, Component::External(app)))
        .collect();
    apps.extend(
        internal
            .into_iter()
            .map(|(id, app)| (id, Component::Internal(app))),
    );

    ReleaseSnapshot {
        core,
        apps,
        themes,
        constraints: old.constraints.clone(),
        sections: old.sections,
    }
}

/// Diff `candidate` against `old` and, if anything differs, merge it.
pub async fn reconcile(
    track: Track,
    old: &Snapshot,
    candidate: &CandidateSnapshot,
    verifier: &dyn ArtifactVerifier,
    concurrency: usize,
) -> Reconciled {
    let diff = ReleaseDiff::new(old, candidate);
    if !diff.has_differences() {
        info!(%track, "no differences");
        return Reconciled::unchanged(track);
    }

    let merged = merge(old, candidate, verifier, concurrency).await;
    let report = TrackReport {
        track,
        core: diff.core_change(),
        apps: merged.changes,
        themes: diff.theme_changes(),
    };
    let snapshot = (merged.snapshot != *old).then_some(merged.snapshot);

    Reconciled {
        report,
        snapshot,
        outcomes: merged.outcomes,
    }
}

/// Reconcile `track` against upstream and persist the result.
pub async fn reconcile_track(
    config: &Config,
    services: &Services,
    track: Track,
) -> Result<Reconciled, TrackError> {
    let path = state_file(&config.state_dir, track);
    let old = store::load(&path, track).await?;
    info!(%track, core = %old.core.version, apps = old.apps.len(), "reconciling");

    let fetcher = services.fetcher.as_ref();
    let addresser = services.addresser.as_ref();

    let discovered = discover_core(
        fetcher,
        &config.update_server_url,
        &old.core.version,
        track,
        &config.php_version,
    )
    .await?;
    let core = match discovered {
        Some(release) => {
            info!(%track, version = %release.version, "new core release");
            let sha256 = verify_known_digest(fetcher, addresser, &release.url)
                .await
                .map_err(|source| TrackError::CoreVerification {
                    version: release.version.clone(),
                    source,
                })?;
            Core {
                version: release.version,
                download_url: Some(release.url),
                sha256: Some(sha256),
            }
        }
        None => old.core.clone(),
    };

    let (url, hash) = core.artifact().ok_or(TrackError::MissingCoreArtifact)?;
    let core_root = addresser
        .realize(url, hash)
        .await
        .map_err(TrackError::Realize)?;
    let trust = TrustStore::load(&core_root)?;

    let platform = core.version.platform();
    let index = fetch_index(fetcher, &config.app_index_url_for(&platform)).await?;
    let external = resolve_apps(&index, &platform, &old.constraints);
    let internal = shipped_apps(&core_root)?;
    info!(%track, %platform, external = external.len(), internal = internal.len(), "resolved apps");

    let themes = upgrade_themes(track, &old.themes, services.heads.as_ref(), addresser).await;
    let candidate = build_candidate(&old, core, external, internal, themes);

    let verifier = SignedArtifactVerifier::new(
        Arc::clone(&services.fetcher),
        Arc::clone(&services.addresser),
        trust,
    );
    let reconciled = reconcile(track, &old, &candidate, &verifier, config.workers()).await;

    if let Some(snapshot) = &reconciled.snapshot {
        store::save(&path, snapshot).await?;
        info!(%track, path = %path.display(), "state updated");
    }
    Ok(reconciled)
}

/// Reconcile every track concurrently. Tracks fail independently.
pub async fn run_tracks(
    config: &Config,
    services: &Services,
    tracks: &[Track],
) -> Vec<(Track, Result<Reconciled, TrackError>)> {
    let runs = tracks.iter().map(|&track| async move {
        let result = reconcile_track(config, services, track).await;
        if let Err(e) = &result {
            warn!(%track, error = %e, "track failed");
        }
        (track, result)
    });
    join_all(runs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::tests::{HASH, internal, snapshot, unverified, v, verified};
    use crate::error::VerifyError;
    use async_trait::async_trait;
    use ncup_schema::{AppVersion, ContentHash, CoreVersion, SignatureInfo};

    struct AcceptAll;

    #[async_trait]
    impl ArtifactVerifier for AcceptAll {
        async fn verify(
            &self,
            _app: &AppId,
            _url: &str,
            _signature: &SignatureInfo,
        ) -> Result<ContentHash, VerifyError> {
            Ok(ContentHash::new(HASH).unwrap())
        }
    }

    fn shipped(name: &str) -> InternalApp {
        InternalApp {
            name: name.into(),
            summary: name.into(),
            description: String::new(),
            licenses: vec!["agpl".into()],
            enabled_by_default: Some(true),
            always_enabled: Some(false),
        }
    }

    fn external_app(version: &str) -> ExternalApp<HashOrSignature> {
        match unverified(version) {
            Component::External(app) => app,
            Component::Internal(_) => unreachable!(),
        }
    }

    #[test]
    fn shipped_apps_override_indexed_ones() {
        let old: Snapshot = snapshot("26.0.0", vec![]);
        let candidate = build_candidate(
            &old,
            old.core.clone(),
            BTreeMap::from([
                (AppId::new("files"), external_app("1.0.0")),
                (AppId::new("notes"), external_app("4.0.0")),
            ]),
            BTreeMap::from([(AppId::new("files"), shipped("Files"))]),
            BTreeMap::new(),
        );

        assert_eq!(candidate.app_version("files"), Some(AppVersion::Internal));
        assert_eq!(candidate.app_version("notes"), Some(AppVersion::Release(v("4.0.0"))));
    }

    #[tokio::test]
    async fn unchanged_track_writes_nothing() {
        let old: Snapshot = snapshot("26.0.0", vec![("a", verified("1.0.0")), ("files", internal())]);
        let candidate = old.clone().into_candidate();

        let reconciled = reconcile(Track::new(26), &old, &candidate, &AcceptAll, 4).await;
        assert!(reconciled.snapshot.is_none());
        assert!(reconciled.report.is_empty());
    }

    #[tokio::test]
    async fn core_bump_is_persisted_and_reported() {
        let old: Snapshot = snapshot("26.0.0", vec![("a", verified("1.0.0"))]);
        let mut candidate = old.clone().into_candidate();
        candidate.core.version = CoreVersion::parse("26.0.1").unwrap();

        let reconciled = reconcile(Track::new(26), &old, &candidate, &AcceptAll, 4).await;
        let snapshot = reconciled.snapshot.unwrap();
        assert_eq!(snapshot.core.version, CoreVersion::parse("26.0.1").unwrap());
        assert!(reconciled.report.core.is_some());
        assert!(reconciled.report.apps.is_empty());
    }

    #[tokio::test]
    async fn updates_are_verified_before_persisting() {
        let old: Snapshot = snapshot("26.0.0", vec![("a", verified("1.0.0"))]);
        let candidate = snapshot("26.0.0", vec![("a", unverified("1.1.0")), ("b", unverified("2.0.0"))]);

        let reconciled = reconcile(Track::new(26), &old, &candidate, &AcceptAll, 2).await;
        let snapshot = reconciled.snapshot.unwrap();
        assert!(snapshot.apps.values().all(|app| match app {
            Component::External(app) => app.artifact.as_str() == HASH,
            Component::Internal(_) => true,
        }));
        assert!(reconciled.report.apps.updated.contains_key("a"));
        assert!(reconciled.report.apps.added.contains_key("b"));
    }
}
