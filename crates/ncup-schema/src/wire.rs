//! Persisted snapshot format (one JSON file per release track).
//!
//! ```json
//! {
//!   "nextcloud": { "version": "25.0.3.2", "url": "...", "sha256": "..." },
//!   "applications": {
//!     "calendar": { "version": "4.2.1", "url": "...", "sha256": "...",
//!                   "meta": { "name": "Calendar", "isShipped": false, ... } },
//!     "files":    { "meta": { "name": "Files", "isShipped": true, ... } }
//!   },
//!   "constraints": { "calendar": ">=4.0 <5.0" },
//!   "themes": { "breeze-dark": { "directory": "...", "github": { ... } } }
//! }
//! ```
//!
//! Only [`Snapshot`] (every artifact verified) has an exporter; a
//! [`CandidateSnapshot`](crate::CandidateSnapshot) cannot be written.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::{ContentHash, DigestError};
use crate::types::{
    AppId, Component, Core, ExternalApp, GitHubSource, InternalApp, Sections, Snapshot, Theme,
    ThemeId, ThemeSource,
};
use crate::version::{CoreVersion, VersionError, VersionRange};

/// Errors produced while importing a persisted snapshot.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// The document is not valid JSON or does not have the expected shape.
    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// An external app lacks one of `version`, `url` or `sha256`.
    #[error("App '{app}' is missing required field '{field}'")]
    MissingField {
        /// App identifier.
        app: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// An app version is not a semantic version.
    #[error("Invalid version for '{context}': {source}")]
    Semver {
        /// Record the version belongs to.
        context: String,
        /// Parser diagnostic.
        source: semver::Error,
    },

    /// The core version or a constraint could not be parsed.
    #[error("Invalid version data for '{context}': {source}")]
    Version {
        /// Record the value belongs to.
        context: String,
        /// Parser diagnostic.
        source: VersionError,
    },

    /// A digest is not in a recognised encoding.
    #[error("Invalid digest for '{context}': {source}")]
    Digest {
        /// Record the digest belongs to.
        context: String,
        /// Validation diagnostic.
        source: DigestError,
    },

    /// A theme has no upstream this version knows how to track.
    #[error("Unsupported upstream for theme '{0}'")]
    UnsupportedThemeSource(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    nextcloud: PersistedCore,
    #[serde(default)]
    applications: BTreeMap<String, PersistedApp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    constraints: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    themes: Option<BTreeMap<String, PersistedTheme>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCore {
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedApp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    meta: PersistedMeta,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedMeta {
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    licenses: Vec<String>,
    #[serde(default)]
    is_shipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_enable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    always_enable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    homepage: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTheme {
    directory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    github: Option<PersistedGitHub>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedGitHub {
    owner: String,
    repo: String,
    rev: String,
    sha256: String,
}

fn content_hash(context: &str, raw: String) -> Result<ContentHash, SchemaError> {
    ContentHash::new(raw).map_err(|source| SchemaError::Digest {
        context: context.to_string(),
        source,
    })
}

fn required<T>(app: &str, field: &'static str, value: Option<T>) -> Result<T, SchemaError> {
    value.ok_or_else(|| SchemaError::MissingField {
        app: app.to_string(),
        field,
    })
}

fn import_app(id: &str, app: PersistedApp) -> Result<Component, SchemaError> {
    let meta = app.meta;

    if meta.is_shipped {
        return Ok(Component::Internal(InternalApp {
            name: meta.name,
            summary: meta.summary,
            description: meta.description,
            licenses: meta.licenses,
            enabled_by_default: meta.default_enable,
            always_enabled: meta.always_enable,
        }));
    }

    let raw_version = required(id, "version", app.version)?;
    let version = Version::parse(&raw_version).map_err(|source| SchemaError::Semver {
        context: id.to_string(),
        source,
    })?;

    Ok(Component::External(ExternalApp {
        name: meta.name,
        version,
        summary: meta.summary,
        description: meta.description,
        homepage: meta.homepage,
        licenses: meta.licenses,
        download_url: required(id, "url", app.url)?,
        artifact: content_hash(id, required(id, "sha256", app.sha256)?)?,
        changelogs: BTreeMap::new(),
    }))
}

fn export_app(app: &Component) -> PersistedApp {
    match app {
        Component::Internal(app) => PersistedApp {
            version: None,
            url: None,
            sha256: None,
            meta: PersistedMeta {
                name: app.name.clone(),
                summary: app.summary.clone(),
                description: app.description.clone(),
                licenses: app.licenses.clone(),
                is_shipped: true,
                default_enable: app.enabled_by_default,
                always_enable: app.always_enabled,
                homepage: None,
            },
        },
        Component::External(app) => PersistedApp {
            version: Some(app.version.to_string()),
            url: Some(app.download_url.clone()),
            sha256: Some(app.artifact.to_string()),
            meta: PersistedMeta {
                name: app.name.clone(),
                summary: app.summary.clone(),
                description: app.description.clone(),
                licenses: app.licenses.clone(),
                is_shipped: false,
                default_enable: None,
                always_enable: None,
                homepage: app.homepage.clone(),
            },
        },
    }
}

fn import_theme(id: &str, theme: PersistedTheme) -> Result<Theme, SchemaError> {
    let github = theme
        .github
        .ok_or_else(|| SchemaError::UnsupportedThemeSource(id.to_string()))?;

    Ok(Theme {
        directory: theme.directory,
        upstream: ThemeSource::GitHub(GitHubSource {
            owner: github.owner,
            repo: github.repo,
            rev: github.rev,
            sha256: content_hash(id, github.sha256)?,
        }),
    })
}

fn export_theme(theme: &Theme) -> PersistedTheme {
    match &theme.upstream {
        ThemeSource::GitHub(gh) => PersistedTheme {
            directory: theme.directory.clone(),
            github: Some(PersistedGitHub {
                owner: gh.owner.clone(),
                repo: gh.repo.clone(),
                rev: gh.rev.clone(),
                sha256: gh.sha256.to_string(),
            }),
        },
    }
}

impl TryFrom<PersistedState> for Snapshot {
    type Error = SchemaError;

    fn try_from(state: PersistedState) -> Result<Self, Self::Error> {
        let version = CoreVersion::parse(&state.nextcloud.version).map_err(|source| {
            SchemaError::Version {
                context: "nextcloud".to_string(),
                source,
            }
        })?;
        let core = Core {
            version,
            download_url: state.nextcloud.url,
            sha256: state
                .nextcloud
                .sha256
                .map(|raw| content_hash("nextcloud", raw))
                .transpose()?,
        };

        let apps = state
            .applications
            .into_iter()
            .map(|(id, app)| Ok((AppId::new(id.clone()), import_app(&id, app)?)))
            .collect::<Result<_, SchemaError>>()?;

        let sections = Sections {
            constraints: state.constraints.is_some(),
            themes: state.themes.is_some(),
        };

        let constraints = state
            .constraints
            .unwrap_or_default()
            .into_iter()
            .map(|(id, expr)| {
                let range = VersionRange::parse(&expr).map_err(|source| SchemaError::Version {
                    context: id.clone(),
                    source,
                })?;
                Ok((AppId::new(id), range))
            })
            .collect::<Result<_, SchemaError>>()?;

        let themes = state
            .themes
            .unwrap_or_default()
            .into_iter()
            .map(|(id, theme)| Ok((ThemeId::new(id.clone()), import_theme(&id, theme)?)))
            .collect::<Result<_, SchemaError>>()?;

        Ok(Self {
            core,
            apps,
            themes,
            constraints,
            sections,
        })
    }
}

impl From<&Snapshot> for PersistedState {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            nextcloud: PersistedCore {
                version: snapshot.core.version.to_string(),
                url: snapshot.core.download_url.clone(),
                sha256: snapshot.core.sha256.as_ref().map(ToString::to_string),
            },
            applications: snapshot
                .apps
                .iter()
                .map(|(id, app)| (id.to_string(), export_app(app)))
                .collect(),
            constraints: (snapshot.sections.constraints || !snapshot.constraints.is_empty()).then(
                || {
                    snapshot
                        .constraints
                        .iter()
                        .map(|(id, range)| (id.to_string(), range.as_str().to_string()))
                        .collect()
                },
            ),
            themes: (snapshot.sections.themes || !snapshot.themes.is_empty()).then(|| {
                snapshot
                    .themes
                    .iter()
                    .map(|(id, theme)| (id.to_string(), export_theme(theme)))
                    .collect()
            }),
        }
    }
}

/// Rebuild every object with its keys in lexicographic order, whatever map
/// backend `serde_json` was compiled with.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

impl Snapshot {
    /// Import a snapshot from a parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if the document does not follow the
    /// persisted format.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let state: PersistedState = serde_json::from_value(value)?;
        state.try_into()
    }

    /// Import a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if the text is not valid JSON or does not
    /// follow the persisted format.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let state: PersistedState = serde_json::from_str(text)?;
        state.try_into()
    }

    /// Export to a JSON document with sorted keys.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] if serialisation fails.
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        Ok(sort_keys(serde_json::to_value(PersistedState::from(self))?))
    }

    /// Export to canonical JSON text: sorted keys, two-space indentation and
    /// a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        let mut text = serde_json::to_string_pretty(&self.to_value()?)?;
        text.push('\n');
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HASH_A: &str = "0v1ggqw8zhv8am3gwy8bsrq3qxv1xc3icxqk7ij9rnpqmwq3g5d1";
    const HASH_B: &str = "1kzq5xg3ssa9yzmxr4r4ikr0cxvxbyfy7ffl2xhbls8bk7pmhsg9";

    fn sample() -> Value {
        json!({
            "nextcloud": {
                "version": "25.0.3.2",
                "url": "https://download.nextcloud.com/server/releases/nextcloud-25.0.3.tar.bz2",
                "sha256": HASH_A,
            },
            "applications": {
                "calendar": {
                    "version": "4.2.1",
                    "url": "https://github.com/nextcloud-releases/calendar/releases/download/v4.2.1/calendar-v4.2.1.tar.gz",
                    "sha256": HASH_B,
                    "meta": {
                        "name": "Calendar",
                        "summary": "A Calendar app",
                        "description": "Calendar for everyone",
                        "licenses": ["agpl"],
                        "isShipped": false,
                        "homepage": "https://github.com/nextcloud/calendar/",
                    },
                },
                "files": {
                    "meta": {
                        "name": "Files",
                        "summary": "File management",
                        "description": "File management",
                        "licenses": ["agpl"],
                        "isShipped": true,
                        "defaultEnable": true,
                        "alwaysEnable": true,
                    },
                },
            },
            "constraints": { "calendar": ">=4.0 <5.0" },
            "themes": {
                "breeze-dark": {
                    "directory": "nextcloud-breeze-dark",
                    "github": {
                        "owner": "mwalbeck",
                        "repo": "nextcloud-breeze-dark",
                        "rev": "4f7c2a3b",
                        "sha256": HASH_A,
                    },
                },
            },
        })
    }

    #[test]
    fn export_of_import_is_identity() {
        let data = sample();
        let snapshot = Snapshot::from_value(data.clone()).unwrap();
        assert_eq!(snapshot.to_value().unwrap(), data);
    }

    #[test]
    fn bootstrap_document_round_trips() {
        let data = json!({ "nextcloud": { "version": "15" }, "applications": {} });
        let snapshot = Snapshot::from_value(data.clone()).unwrap();
        assert!(snapshot.core.artifact().is_none());
        assert_eq!(snapshot.to_value().unwrap(), data);
    }

    #[test]
    fn flags_and_sections_are_written_back_as_read() {
        // Shipped apps with only `defaultEnable`, no `constraints` or `themes`
        let data = json!({
            "nextcloud": {
                "version": "25.0.3.2",
                "url": "https://download.nextcloud.com/server/releases/nextcloud-25.0.3.tar.bz2",
                "sha256": HASH_A,
            },
            "applications": {
                "activity": {
                    "meta": {
                        "name": "Activity",
                        "summary": "",
                        "description": "",
                        "licenses": ["agpl"],
                        "isShipped": true,
                        "defaultEnable": false,
                    },
                },
            },
        });
        let snapshot = Snapshot::from_value(data.clone()).unwrap();
        assert_eq!(snapshot.to_value().unwrap(), data);

        let empty = json!({
            "nextcloud": { "version": "26" },
            "applications": {},
            "constraints": {},
            "themes": {},
        });
        let snapshot = Snapshot::from_value(empty.clone()).unwrap();
        assert!(snapshot.sections.constraints && snapshot.sections.themes);
        assert_eq!(snapshot.to_value().unwrap(), empty);
    }

    #[test]
    fn import_builds_sum_types() {
        let snapshot = Snapshot::from_value(sample()).unwrap();
        assert!(matches!(
            snapshot.apps.get("files"),
            Some(Component::Internal(InternalApp {
                always_enabled: Some(true),
                ..
            }))
        ));
        match snapshot.apps.get("calendar") {
            Some(Component::External(app)) => {
                assert_eq!(app.version, Version::new(4, 2, 1));
                assert_eq!(app.artifact.as_str(), HASH_B);
            }
            other => panic!("unexpected component: {other:?}"),
        }
        assert!(
            snapshot.constraints[&AppId::new("calendar")].matches(&Version::new(4, 9, 0))
        );
    }

    #[test]
    fn json_text_is_canonical() {
        let snapshot = Snapshot::from_value(sample()).unwrap();
        let text = snapshot.to_json().unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.starts_with("{\n  \"applications\": {"));
        // Sorted keys: "description" precedes "homepage" precedes "isShipped"
        let desc = text.find("\"description\"").unwrap();
        let home = text.find("\"homepage\"").unwrap();
        let shipped = text.find("\"isShipped\"").unwrap();
        assert!(desc < home && home < shipped);
        assert_eq!(Snapshot::from_json(&text).unwrap(), snapshot);
    }

    #[test]
    fn external_app_without_hash_is_rejected() {
        let mut data = sample();
        data["applications"]["calendar"]
            .as_object_mut()
            .unwrap()
            .remove("sha256");
        let err = Snapshot::from_value(data).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingField {
                field: "sha256",
                ..
            }
        ));
    }

    #[test]
    fn invalid_constraint_is_rejected() {
        let mut data = sample();
        data["constraints"]["calendar"] = json!(">=four");
        assert!(matches!(
            Snapshot::from_value(data),
            Err(SchemaError::Version { .. })
        ));
    }

    #[test]
    fn theme_without_upstream_is_rejected() {
        let mut data = sample();
        data["themes"]["breeze-dark"]
            .as_object_mut()
            .unwrap()
            .remove("github");
        assert!(matches!(
            Snapshot::from_value(data),
            Err(SchemaError::UnsupportedThemeSource(_))
        ));
    }
}
