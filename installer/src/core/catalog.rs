//! Built-in program catalogs, keyed by tier and platform.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::types::{Platform, ProgramRequest};

/// Predefined program selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// A small set of everyday applications.
    Basic,
    /// A full developer workstation.
    Developer,
}

const BASIC_LINUX: &[&str] = &["vlc", "docker.io", "git", "code"];
const BASIC_DARWIN: &[&str] = &["vlc", "docker", "git", "visual-studio-code", "google-chrome"];
const BASIC_WINDOWS: &[&str] = &["vlc", "docker-desktop", "git", "vscode", "googlechrome"];

const DEVELOPER_LINUX: &[&str] = &[
    "git",
    "docker.io",
    "code",
    "postman",
    "dbeaver-ce",
    "libreoffice",
    "evince",
    "slack",
    "vlc",
    "gimp",
    "spotify-client",
];
const DEVELOPER_DARWIN: &[&str] = &[
    "git",
    "docker",
    "visual-studio-code",
    "postman",
    "dbeaver-community",
    "libreoffice",
    "adobe-acrobat-reader",
    "slack",
    "vlc",
    "gimp",
    "spotify",
];
const DEVELOPER_WINDOWS: &[&str] = &[
    "git",
    "docker-desktop",
    "vscode",
    "postman",
    "dbeaver",
    "libreoffice",
    "adobereader",
    "slack",
    "vlc",
    "gimp",
    "spotify",
];

/// Look up the catalog for `tier` on `platform`.
pub fn catalog(tier: Tier, platform: Platform) -> ProgramRequest {
    let names = match (tier, platform) {
        (Tier::Basic, Platform::Linux) => BASIC_LINUX,
        (Tier::Basic, Platform::Darwin) => BASIC_DARWIN,
        (Tier::Basic, Platform::Windows) => BASIC_WINDOWS,
        (Tier::Developer, Platform::Linux) => DEVELOPER_LINUX,
        (Tier::Developer, Platform::Darwin) => DEVELOPER_DARWIN,
        (Tier::Developer, Platform::Windows) => DEVELOPER_WINDOWS,
    };
    names.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_darwin_uses_cask_names() {
        let programs = catalog(Tier::Basic, Platform::Darwin);
        assert_eq!(
            programs.as_slice(),
            ["vlc", "docker", "git", "visual-studio-code", "google-chrome"]
        );
    }

    #[test]
    fn developer_catalogs_are_larger_than_basic() {
        for platform in [Platform::Linux, Platform::Darwin, Platform::Windows] {
            let basic = catalog(Tier::Basic, platform);
            let developer = catalog(Tier::Developer, platform);
            assert!(developer.len() > basic.len(), "{platform}");
        }
    }
}
