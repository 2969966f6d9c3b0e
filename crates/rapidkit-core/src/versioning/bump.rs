//! Semver parsing and bumping

use crate::error::{Error, Result};
use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which semver component a bump increments
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    Patch,
    Minor,
    Major,
}

impl fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BumpLevel::Patch => "patch",
            BumpLevel::Minor => "minor",
            BumpLevel::Major => "major",
        })
    }
}

/// Parse version string, handling a leading `v`
pub fn parse_version(version_str: &str) -> Result<Version> {
    let trimmed = version_str.trim();
    let cleaned = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(cleaned).map_err(|source| Error::Version {
        version: version_str.to_string(),
        source,
    })
}

/// Increment `version` at `level`, resetting lower components.
/// Pre-release and build metadata are dropped.
pub fn bump(version: &Version, level: BumpLevel) -> Version {
    let mut next = Version::new(version.major, version.minor, version.patch);
    match level {
        BumpLevel::Major => {
            next.major += 1;
            next.minor = 0;
            next.patch = 0;
        }
        BumpLevel::Minor => {
            next.minor += 1;
            next.patch = 0;
        }
        BumpLevel::Patch => {
            // 1.2.0-rc.1 releases as 1.2.0
            if version.pre.is_empty() {
                next.patch += 1;
            }
        }
    }
    next.pre = Prerelease::EMPTY;
    next.build = BuildMetadata::EMPTY;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_strips_v() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version(" 0.4.0 ").unwrap(), Version::new(0, 4, 0));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(parse_version("1.2").is_err());
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn test_bump_levels() {
        let v = Version::new(1, 2, 3);
        assert_eq!(bump(&v, BumpLevel::Patch), Version::new(1, 2, 4));
        assert_eq!(bump(&v, BumpLevel::Minor), Version::new(1, 3, 0));
        assert_eq!(bump(&v, BumpLevel::Major), Version::new(2, 0, 0));
    }

    #[test]
    fn test_bump_is_monotonic_for_prereleases() {
        let v = Version::parse("1.2.0-rc.1").unwrap();
        for level in [BumpLevel::Patch, BumpLevel::Minor, BumpLevel::Major] {
            assert!(bump(&v, level) > v, "{level} bump must increase {v}");
        }
    }
}
