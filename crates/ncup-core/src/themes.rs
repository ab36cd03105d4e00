//! Themes tracked by branch head on GitHub.
//!
//! Only themes already present in a track's state are upgraded. Each one
//! follows a branch of its repository named after the track; a moved head is
//! prefetched to obtain its content-address.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ncup_schema::{GitHubSource, Theme, ThemeId, ThemeSource, Track};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{FetchError, ThemeError};
use crate::io::ContentAddresser;

/// Where a known theme lives upstream.
#[derive(Debug, Clone, Copy)]
pub struct ThemeInfo {
    pub owner: &'static str,
    pub repo: &'static str,
    pub directory: &'static str,
    branch: fn(Track) -> String,
}

impl ThemeInfo {
    /// The branch followed for `track`.
    pub fn branch(&self, track: Track) -> String {
        (self.branch)(track)
    }
}

const THEMES: &[(&str, ThemeInfo)] = &[(
    "breeze-dark",
    ThemeInfo {
        owner: "mwalbeck",
        repo: "nextcloud-breeze-dark",
        directory: "nextcloud-breeze-dark",
        branch: |track| track.major().to_string(),
    },
)];

/// Look up a known theme.
pub fn known_theme(id: &str) -> Option<&'static ThemeInfo> {
    THEMES
        .iter()
        .find_map(|(name, info)| (*name == id).then_some(info))
}

/// Resolves the head commit of a repository branch.
#[async_trait]
pub trait BranchHeads: Send + Sync {
    async fn branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String, ThemeError>;
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
}

/// GitHub REST API client.
#[derive(Debug, Clone)]
pub struct GitHubApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubApi {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Self::new(
            config.github_api_url.clone(),
            config.github_token.clone(),
            config.connect_timeout(),
            config.http_timeout(),
        )
    }
}

#[async_trait]
impl BranchHeads for GitHubApi {
    async fn branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String, ThemeError> {
        let url = format!("{}/repos/{owner}/{repo}/branches/{branch}", self.base_url);
        debug!(url = %url, "querying branch head");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let http = |source| FetchError::Http {
            url: url.clone(),
            source,
        };
        let response = request.send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(http)?;
        let branch: BranchResponse = serde_json::from_slice(&body)?;
        Ok(branch.commit.sha)
    }
}

async fn upgrade_theme(
    track: Track,
    info: &ThemeInfo,
    old: &Theme,
    heads: &dyn BranchHeads,
    addresser: &dyn ContentAddresser,
) -> Result<Theme, ThemeError> {
    let ThemeSource::GitHub(pinned) = &old.upstream;

    let head = heads
        .branch_head(info.owner, info.repo, &info.branch(track))
        .await?;
    let same_repo = pinned.owner == info.owner && pinned.repo == info.repo;
    if same_repo && pinned.rev == head {
        return Ok(Theme {
            directory: info.directory.to_string(),
            upstream: old.upstream.clone(),
        });
    }

    let sha256 = addresser.prefetch_github(info.owner, info.repo, &head).await?;
    Ok(Theme {
        directory: info.directory.to_string(),
        upstream: ThemeSource::GitHub(GitHubSource {
            owner: info.owner.to_string(),
            repo: info.repo.to_string(),
            rev: head,
            sha256,
        }),
    })
}

/// Bring every theme of `old` up to its branch head for `track`.
///
/// Unknown themes and themes that fail to upgrade are kept as they were.
pub async fn upgrade_themes(
    track: Track,
    old: &BTreeMap<ThemeId, Theme>,
    heads: &dyn BranchHeads,
    addresser: &dyn ContentAddresser,
) -> BTreeMap<ThemeId, Theme> {
    let mut themes = BTreeMap::new();

    for (id, theme) in old {
        let Some(info) = known_theme(id.as_str()) else {
            warn!(theme = %id, %track, "unknown theme, keeping it unchanged");
            themes.insert(id.clone(), theme.clone());
            continue;
        };

        let upgraded = match upgrade_theme(track, info, theme, heads, addresser).await {
            Ok(upgraded) => {
                if upgraded.rev() != theme.rev() {
                    info!(theme = %id, %track, rev = upgraded.rev(), "theme moved");
                }
                upgraded
            }
            Err(error) => {
                warn!(theme = %id, %track, %error, "theme upgrade failed, keeping current revision");
                theme.clone()
            }
        };
        themes.insert(id.clone(), upgraded);
    }

    themes
}
