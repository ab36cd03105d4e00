//! Core release discovery through the update server.
//!
//! The server is asked, as an installation of the current version would,
//! whether an update is available. Anything other than a well-formed answer
//! naming a newer release on the same major version means "no update".

use ncup_schema::{CoreVersion, Track};
use semver::Version;
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::io::Fetcher;
use crate::xml::child_texts;

const CHANNEL: &str = "stable";

/// A newer core release announced by the update server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreRelease {
    pub version: CoreVersion,
    pub url: String,
}

/// The `version` query value: twelve fields joined by `x`.
///
/// Fields are major, minor, maintenance and revision of the installed
/// version, installation time, last check, channel, edition, build, then
/// PHP major, minor and release. Components not written in `current` are
/// sent as zero, the way an installation reports its own version.
pub fn update_query(current: &CoreVersion, php: &Version) -> String {
    let part = |i: usize| current.component(i).to_string();

    let fields = [
        part(0),
        part(1),
        part(2),
        part(3),
        String::new(),
        String::new(),
        CHANNEL.to_string(),
        String::new(),
        String::new(),
        php.major.to_string(),
        php.minor.to_string(),
        php.patch.to_string(),
    ];
    fields.join("x")
}

fn tarball_url(url: &str) -> String {
    if url.to_ascii_lowercase().ends_with(".zip") {
        format!("{}.tar.bz2", &url[..url.len() - 4])
    } else {
        url.to_string()
    }
}

/// Interpret an update server response for an installation of `current`.
pub fn interpret_response(body: &str, current: &CoreVersion, track: Track) -> Option<CoreRelease> {
    let fields = match child_texts(body) {
        Ok(fields) => fields,
        Err(e) => {
            debug!(error = %e, "unparseable update server response");
            return None;
        }
    };

    let version = CoreVersion::parse(fields.get("version")?).ok()?;
    if version <= *current {
        return None;
    }
    if version.major() != track.major() {
        info!(%track, %version, "ignoring release outside the track");
        return None;
    }

    let url = fields.get("url")?.trim();
    if url.is_empty() {
        return None;
    }

    Some(CoreRelease {
        version,
        url: tarball_url(url),
    })
}

/// Ask the update server at `server_url` for a core release newer than
/// `current` within `track`.
pub async fn discover_core(
    fetcher: &dyn Fetcher,
    server_url: &str,
    current: &CoreVersion,
    track: Track,
    php: &Version,
) -> Result<Option<CoreRelease>, DiscoveryError> {
    let separator = if server_url.contains('?') { '&' } else { '?' };
    let url = format!("{server_url}{separator}version={}", update_query(current, php));

    let body = fetcher.fetch(&url, true).await?;
    let release = interpret_response(&String::from_utf8_lossy(&body), current, track);
    debug!(%track, found = release.is_some(), "queried update server");
    Ok(release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::HttpFetcher;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    const RESPONSE: &str = r#"<?xml version="1.0"?>
<nextcloud>
 <version>25.0.4.1</version>
 <versionstring>Nextcloud 25.0.4</versionstring>
 <url>https://download.nextcloud.com/server/releases/nextcloud-25.0.4.zip</url>
 <web>https://docs.nextcloud.com/server/latest/admin_manual/maintenance/upgrade.html</web>
 <changes>https://updates.nextcloud.com/changelog_server/?version=25.0.4</changes>
 <autoupdater>1</autoupdater>
 <eol>0</eol>
</nextcloud>
"#;

    fn v(s: &str) -> CoreVersion {
        CoreVersion::parse(s).unwrap()
    }

    #[test]
    fn query_has_twelve_fields() {
        let query = update_query(&v("25.0.3.2"), &Version::new(8, 2, 0));
        assert_eq!(query, "25x0x3x2xxxstablexxx8x2x0");
        assert_eq!(query.split('x').count(), 12);
    }

    #[test]
    fn unwritten_components_are_zero() {
        let query = update_query(&v("15"), &Version::new(8, 1, 14));
        assert_eq!(query, "15x0x0x0xxxstablexxx8x1x14");

        let bootstrap = update_query(&CoreVersion::from_major(26), &Version::new(8, 2, 0));
        assert_eq!(bootstrap, "26x0x0x0xxxstablexxx8x2x0");
    }

    #[test]
    fn newer_release_is_found_and_rewritten() {
        let release = interpret_response(RESPONSE, &v("25.0.3.2"), Track::new(25)).unwrap();
        assert_eq!(release.version, v("25.0.4.1"));
        assert_eq!(
            release.url,
            "https://download.nextcloud.com/server/releases/nextcloud-25.0.4.tar.bz2"
        );
    }

    #[test]
    fn no_update_cases() {
        let current = v("25.0.3.2");
        let track = Track::new(25);
        assert!(interpret_response("", &current, track).is_none());
        assert!(interpret_response("<nextcloud/>", &current, track).is_none());
        assert!(interpret_response("<nextcloud><version>", &current, track).is_none());
        assert!(interpret_response(RESPONSE, &v("25.0.4.1"), track).is_none());
        assert!(interpret_response(RESPONSE, &v("24.0.9"), Track::new(24)).is_none());

        let no_url = "<nextcloud><version>25.0.5.0</version></nextcloud>";
        assert!(interpret_response(no_url, &current, track).is_none());
    }

    #[test]
    fn bootstrap_version_compares_padded() {
        let release = interpret_response(RESPONSE, &v("25"), Track::new(25)).unwrap();
        assert_eq!(release.version, v("25.0.4.1"));
    }

    #[tokio::test]
    async fn queries_update_server() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/updater_server/")
            .match_query(Matcher::UrlEncoded(
                "version".into(),
                "25x0x3x2xxxstablexxx8x2x0".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(RESPONSE)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5), Duration::from_secs(10)).unwrap();
        let release = discover_core(
            &fetcher,
            &format!("{}/updater_server/", server.url()),
            &v("25.0.3.2"),
            Track::new(25),
            &Version::new(8, 2, 0),
        )
        .await
        .unwrap();

        assert_eq!(release.map(|r| r.version), Some(v("25.0.4.1")));
    }
}
