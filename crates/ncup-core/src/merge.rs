//! Turning a candidate snapshot into the next persisted snapshot.
//!
//! Verification of each pending app is independent; the results are then
//! folded into the final snapshot and a corrected change set that describes
//! what was actually persisted.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use ncup_schema::{
    AppChanges, AppId, CandidateSnapshot, Component, ContentHash, HashOrSignature,
    ReleaseSnapshot, SignatureInfo, Snapshot,
};
use tracing::{info, warn};

use crate::diff::ReleaseDiff;
use crate::error::VerifyError;
use crate::verify::ArtifactVerifier;

/// What happened to an app that needed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppOutcome {
    /// Verified and persisted at its new version.
    Verified,
    /// Verification failed; the previous entry was kept.
    RolledBack,
    /// Verification failed and there was no previous entry.
    Dropped,
}

#[derive(Debug)]
pub struct MergeResult {
    pub snapshot: Snapshot,
    /// Changes that were actually carried out.
    pub changes: AppChanges,
    pub outcomes: BTreeMap<AppId, AppOutcome>,
}

impl MergeResult {
    pub fn count(&self, outcome: AppOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }
}

/// Apps in `joined` whose artifact still needs verification.
fn pending(joined: &CandidateSnapshot) -> Vec<(AppId, String, SignatureInfo)> {
    joined
        .apps
        .iter()
        .filter_map(|(id, app)| match app {
            Component::External(app) => app
                .artifact
                .signature()
                .map(|sig| (id.clone(), app.download_url.clone(), sig.clone())),
            Component::Internal(_) => None,
        })
        .collect()
}

/// Diff `candidate` against `old`, verify every new or changed artifact with
/// at most `concurrency` verifications in flight, and fold the results.
pub async fn merge(
    old: &Snapshot,
    candidate: &CandidateSnapshot,
    verifier: &dyn ArtifactVerifier,
    concurrency: usize,
) -> MergeResult {
    let diff = ReleaseDiff::new(old, candidate);
    let changes = diff.changes();
    let joined = diff.join();

    let results: BTreeMap<AppId, Result<ContentHash, VerifyError>> = stream::iter(pending(&joined))
        .map(|(id, url, signature)| async move {
            let result = verifier.verify(&id, &url, &signature).await;
            (id, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    fold_outcomes(old, joined, changes, results)
}

/// Settle every entry of `joined` using the verification `results`.
///
/// A verified artifact replaces the signature. A failed one rolls the app
/// back to its entry in `old`, or drops it if `old` has none, and the
/// corresponding change is withdrawn from `changes`.
pub fn fold_outcomes(
    old: &Snapshot,
    joined: CandidateSnapshot,
    mut changes: AppChanges,
    mut results: BTreeMap<AppId, Result<ContentHash, VerifyError>>,
) -> MergeResult {
    let mut apps = BTreeMap::new();
    let mut outcomes = BTreeMap::new();

    for (id, component) in joined.apps {
        let app = match component {
            Component::Internal(app) => {
                apps.insert(id, Component::Internal(app));
                continue;
            }
            Component::External(app) => app,
        };

        let verified = match &app.artifact {
            HashOrSignature::Verified(hash) => {
                apps.insert(id, Component::External(app.clone().with_artifact(hash.clone())));
                continue;
            }
            HashOrSignature::Unverified(_) => match results.remove(&id) {
                Some(result) => result.map_err(|e| e.to_string()),
                None => Err("verification did not run".to_string()),
            },
        };

        match verified {
            Ok(hash) => {
                outcomes.insert(id.clone(), AppOutcome::Verified);
                apps.insert(id, Component::External(app.with_artifact(hash)));
            }
            Err(error) => match old.apps.get(&id) {
                Some(previous) => {
                    warn!(app = %id, version = %app.version, %error, "verification failed, keeping previous version");
                    changes.retract_version_change(&id);
                    outcomes.insert(id.clone(), AppOutcome::RolledBack);
                    apps.insert(id, previous.clone());
                }
                None => {
                    warn!(app = %id, version = %app.version, %error, "verification failed, dropping new app");
                    changes.retract_addition(&id);
                    outcomes.insert(id, AppOutcome::Dropped);
                }
            },
        }
    }

    let result = MergeResult {
        snapshot: ReleaseSnapshot {
            core: joined.core,
            apps,
            themes: joined.themes,
            constraints: joined.constraints,
            sections: joined.sections,
        },
        changes,
        outcomes,
    };
    info!(
        verified = result.count(AppOutcome::Verified),
        rolled_back = result.count(AppOutcome::RolledBack),
        dropped = result.count(AppOutcome::Dropped),
        "merged"
    );
    result
}
