//! Release selection for a single app.
//!
//! Each app is resolved independently against the target platform version;
//! there is no dependency graph between apps.

use ncup_schema::{VersionRange, is_stable_release};
use semver::Version;

/// One published release of an app, as listed by the remote index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    pub nightly: bool,
    /// Platform versions the release declares compatibility with.
    pub platforms: VersionRange,
    pub licenses: Vec<String>,
    pub download: String,
    /// Base64 signature over the release archive.
    pub signature: String,
}

/// Whether `release` may be selected for `platform` under an optional pin.
pub fn is_acceptable(release: &Release, platform: &Version, pin: Option<&VersionRange>) -> bool {
    if release.nightly || !release.version.pre.is_empty() {
        return false;
    }
    if !is_stable_release(&release.version.to_string()) {
        return false;
    }
    if !release.platforms.matches(platform) {
        return false;
    }
    pin.is_none_or(|range| range.matches(&release.version))
}

/// Select the newest acceptable release.
///
/// `None` means the app is not offered for this platform version.
pub fn latest_release_for<'a>(
    platform: &Version,
    releases: &'a [Release],
    pin: Option<&VersionRange>,
) -> Option<&'a Release> {
    releases
        .iter()
        .filter(|release| is_acceptable(release, platform, pin))
        .max_by(|a, b| a.version.cmp(&b.version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(version: &str, platforms: &str) -> Release {
        Release {
            version: Version::parse(version).unwrap(),
            nightly: false,
            platforms: VersionRange::parse(platforms).unwrap(),
            licenses: vec!["agpl".to_string()],
            download: format!("https://example.com/app-{version}.tar.gz"),
            signature: "c2ln".to_string(),
        }
    }

    fn platform() -> Version {
        Version::new(26, 0, 1)
    }

    #[test]
    fn picks_newest_compatible() {
        let releases = vec![
            release("1.0.0", ">=25 <=27"),
            release("1.2.0", ">=26 <=27"),
            release("2.0.0", ">=28"),
        ];
        let chosen = latest_release_for(&platform(), &releases, None).unwrap();
        assert_eq!(chosen.version, Version::new(1, 2, 0));
    }

    #[test]
    fn skips_nightly_and_prerelease() {
        let mut nightly = release("1.3.0", ">=26");
        nightly.nightly = true;
        let releases = vec![
            release("1.0.0", ">=26"),
            nightly,
            release("1.4.0-beta.2", ">=26"),
            release("1.5.0+build-7", ">=26"),
        ];
        let chosen = latest_release_for(&platform(), &releases, None).unwrap();
        assert_eq!(chosen.version, Version::new(1, 0, 0));
    }

    #[test]
    fn pin_limits_selection() {
        let releases = vec![
            release("3.9.1", ">=26"),
            release("4.0.0", ">=26"),
            release("4.2.1", ">=26"),
        ];
        let pin = VersionRange::parse("<4.0.0").unwrap();
        let chosen = latest_release_for(&platform(), &releases, Some(&pin)).unwrap();
        assert_eq!(chosen.version, Version::new(3, 9, 1));
    }

    #[test]
    fn nothing_compatible_is_none() {
        let releases = vec![release("1.0.0", ">=27"), release("0.9.0", "<=25")];
        assert!(latest_release_for(&platform(), &releases, None).is_none());
        assert!(latest_release_for(&platform(), &[], None).is_none());
    }

    #[test]
    fn every_accepted_candidate_satisfies_all_constraints() {
        let mut releases = Vec::new();
        for (i, platforms) in [">=24 <=25", ">=25 <=26", ">=26", "<=27", ">=27"].iter().enumerate() {
            for minor in 0..4u64 {
                let mut r = release(&format!("{i}.{minor}.0"), platforms);
                r.nightly = minor == 3;
                releases.push(r);
            }
        }
        let pin = VersionRange::parse(">=1.0.0, <3.2.0").unwrap();

        let chosen = latest_release_for(&platform(), &releases, Some(&pin)).unwrap();
        assert!(chosen.platforms.matches(&platform()));
        assert!(!chosen.nightly);
        assert!(pin.matches(&chosen.version));
        assert_eq!(chosen.version, Version::new(3, 1, 0));
    }
}
