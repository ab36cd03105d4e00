//! Remote app index (`apps.json`).
//!
//! The index is decoded record by record: a malformed app or release is
//! logged and skipped without affecting its neighbours.

use std::collections::{BTreeMap, HashMap};

use ncup_schema::{AppId, ExternalApp, HashOrSignature, SignatureInfo, VersionRange};
use semver::Version;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IndexError;
use crate::io::Fetcher;
use crate::resolver::{Release, latest_release_for};

const LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
struct RawApp {
    id: String,
    translations: HashMap<String, RawAppTranslation>,
    #[serde(default)]
    website: Option<String>,
    certificate: String,
    #[serde(default)]
    releases: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawAppTranslation {
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelease {
    version: String,
    #[serde(default)]
    is_nightly: bool,
    raw_platform_version_spec: String,
    #[serde(default)]
    licenses: Vec<String>,
    download: String,
    signature: String,
    #[serde(default)]
    translations: HashMap<String, RawReleaseTranslation>,
}

#[derive(Debug, Deserialize)]
struct RawReleaseTranslation {
    #[serde(default)]
    changelog: String,
}

/// An app as listed by the remote index, with every usable release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexApp {
    pub id: AppId,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub homepage: Option<String>,
    /// PEM distributor certificate shared by all releases.
    pub certificate: String,
    pub releases: Vec<Release>,
    /// English release notes of every release with a parseable version.
    pub changelogs: BTreeMap<Version, String>,
}

impl IndexApp {
    /// Resolve the best release for `platform` into an unverified app entry.
    pub fn resolve(
        &self,
        platform: &Version,
        pin: Option<&VersionRange>,
    ) -> Option<ExternalApp<HashOrSignature>> {
        let release = latest_release_for(platform, &self.releases, pin)?;
        Some(ExternalApp {
            name: self.name.clone(),
            version: release.version.clone(),
            summary: self.summary.clone(),
            description: self.description.clone(),
            homepage: self.homepage.clone(),
            licenses: release.licenses.clone(),
            download_url: release.download.clone(),
            artifact: HashOrSignature::Unverified(SignatureInfo {
                certificate: self.certificate.clone(),
                signature: release.signature.clone(),
            }),
            changelogs: self.changelogs.clone(),
        })
    }
}

fn decode_release(app: &str, raw: RawRelease) -> Result<Release, String> {
    let version = Version::parse(raw.version.trim())
        .map_err(|e| format!("version '{}': {e}", raw.version))?;
    let platforms = VersionRange::parse(&raw.raw_platform_version_spec).map_err(|e| e.to_string())?;
    debug!(app, %version, "release");

    Ok(Release {
        version,
        nightly: raw.is_nightly,
        platforms,
        licenses: raw.licenses,
        download: raw.download,
        signature: raw.signature,
    })
}

fn decode_app(raw: RawApp) -> Result<IndexApp, String> {
    let RawApp {
        id,
        mut translations,
        website,
        certificate,
        releases: raw_releases,
    } = raw;

    let text = translations
        .remove(LANGUAGE)
        .ok_or_else(|| format!("no '{LANGUAGE}' translation"))?;

    let mut releases = Vec::new();
    let mut changelogs = BTreeMap::new();
    for value in raw_releases {
        let raw = match serde_json::from_value::<RawRelease>(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(app = %id, error = %e, "skipping malformed release");
                continue;
            }
        };

        if let Ok(version) = Version::parse(raw.version.trim()) {
            let changelog = raw
                .translations
                .get(LANGUAGE)
                .map(|t| t.changelog.clone())
                .unwrap_or_default();
            changelogs.insert(version, changelog);
        }

        match decode_release(&id, raw) {
            Ok(release) => releases.push(release),
            Err(e) => warn!(app = %id, error = %e, "skipping malformed release"),
        }
    }

    Ok(IndexApp {
        id: AppId::new(id),
        name: text.name,
        summary: text.summary,
        description: text.description,
        homepage: website.filter(|w| !w.is_empty()),
        certificate,
        releases,
        changelogs,
    })
}

/// Parse an `apps.json` document.
///
/// Only a body that is not a JSON array is an error; malformed records are
/// skipped.
pub fn parse_index(body: &[u8]) -> Result<Vec<IndexApp>, IndexError> {
    let records: Vec<Value> = serde_json::from_slice(body)?;
    let total = records.len();

    let apps: Vec<IndexApp> = records
        .into_iter()
        .filter_map(|value| {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            let decoded = serde_json::from_value::<RawApp>(value)
                .map_err(|e| e.to_string())
                .and_then(decode_app);
            match decoded {
                Ok(app) => Some(app),
                Err(e) => {
                    warn!(app = %id, error = %e, "skipping malformed app");
                    None
                }
            }
        })
        .collect();

    debug!(total, usable = apps.len(), "parsed app index");
    Ok(apps)
}

/// Fetch and parse the app index at `url`.
pub async fn fetch_index(fetcher: &dyn Fetcher, url: &str) -> Result<Vec<IndexApp>, IndexError> {
    let body = fetcher.fetch(url, true).await?;
    parse_index(&body)
}

/// Resolve every indexed app for `platform`, honouring per-app pins.
///
/// Apps without an acceptable release are left out.
pub fn resolve_apps(
    apps: &[IndexApp],
    platform: &Version,
    pins: &BTreeMap<AppId, VersionRange>,
) -> BTreeMap<AppId, ExternalApp<HashOrSignature>> {
    apps.iter()
        .filter_map(|app| {
            let resolved = app.resolve(platform, pins.get(&app.id));
            if resolved.is_none() {
                debug!(app = %app.id, %platform, "no compatible release");
            }
            resolved.map(|resolved| (app.id.clone(), resolved))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn release(version: &str, spec: &str) -> Value {
        json!({
            "version": version,
            "isNightly": false,
            "rawPlatformVersionSpec": spec,
            "licenses": ["agpl"],
            "download": format!("https://github.com/nextcloud-releases/calendar/releases/download/v{version}/calendar-v{version}.tar.gz"),
            "signature": "c2lnbmF0dXJl",
            "translations": { "en": { "changelog": format!("### Changed\n- release {version}") } },
        })
    }

    fn index() -> Value {
        json!([
            {
                "id": "calendar",
                "website": "https://github.com/nextcloud/calendar/",
                "certificate": "-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----",
                "translations": { "en": {
                    "name": "Calendar",
                    "summary": "A Calendar app",
                    "description": "Calendar for everyone",
                } },
                "releases": [
                    release("4.1.0", ">=24 <=26"),
                    release("4.2.1", ">=25 <=26"),
                    release("4.3.0-beta.1", ">=25 <=26"),
                    release("5.0.0", ">=27"),
                    { "version": "4.2.2" },
                    release("4.2.3", ">=banana"),
                ],
            },
            {
                "id": "notes",
                "website": "",
                "certificate": "pem",
                "translations": { "en": { "name": "Notes" } },
                "releases": [ release("4.7.0", ">=25") ],
            },
            { "id": "broken", "translations": {} },
            "not an object",
        ])
    }

    fn parsed() -> Vec<IndexApp> {
        parse_index(index().to_string().as_bytes()).unwrap()
    }

    #[test]
    fn malformed_records_are_skipped() {
        let apps = parsed();
        let ids: Vec<&str> = apps.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["calendar", "notes"]);

        // "4.2.2" has no platform spec and "4.2.3" an invalid one
        assert_eq!(apps[0].releases.len(), 4);
    }

    #[test]
    fn changelogs_cover_every_parseable_version() {
        let apps = parsed();
        let versions: Vec<String> = apps[0].changelogs.keys().map(ToString::to_string).collect();
        assert_eq!(
            versions,
            vec!["4.1.0", "4.2.1", "4.2.3", "4.3.0-beta.1", "5.0.0"]
        );
    }

    #[test]
    fn empty_website_is_no_homepage() {
        let apps = parsed();
        assert_eq!(
            apps[0].homepage.as_deref(),
            Some("https://github.com/nextcloud/calendar/")
        );
        assert_eq!(apps[1].homepage, None);
        assert_eq!(apps[1].summary, "");
    }

    #[test]
    fn resolves_with_pins() {
        let apps = parsed();
        let platform = Version::new(26, 0, 1);

        let resolved = resolve_apps(&apps, &platform, &BTreeMap::new());
        let calendar = &resolved[&AppId::new("calendar")];
        assert_eq!(calendar.version, Version::new(4, 2, 1));
        assert!(calendar.download_url.ends_with("calendar-v4.2.1.tar.gz"));
        assert!(matches!(
            &calendar.artifact,
            HashOrSignature::Unverified(sig) if sig.signature == "c2lnbmF0dXJl"
        ));

        let pins = BTreeMap::from([(AppId::new("calendar"), VersionRange::parse("<4.2").unwrap())]);
        let resolved = resolve_apps(&apps, &platform, &pins);
        assert_eq!(resolved[&AppId::new("calendar")].version, Version::new(4, 1, 0));
    }

    #[test]
    fn apps_without_compatible_release_are_dropped() {
        let apps = parsed();
        let resolved = resolve_apps(&apps, &Version::new(24, 0, 0), &BTreeMap::new());
        assert!(resolved.contains_key("calendar"));
        assert!(!resolved.contains_key("notes"));
    }

    #[test]
    fn non_array_body_is_an_error() {
        assert!(matches!(
            parse_index(b"{\"apps\": []}"),
            Err(IndexError::Json(_))
        ));
    }
}
