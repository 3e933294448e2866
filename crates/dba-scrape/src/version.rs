//! Server versions used to gate scrapers.

use derive_more::{Display, Error};

use std::str::FromStr;

/// Database server version, such as `8.0.34`. Versions are compared component-wise.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{major}.{minor}.{patch}")]
pub struct ServerVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl ServerVersion {
    /// Creates a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// Error parsing a [`ServerVersion`].
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum VersionParseError {
    /// Version string doesn't start with a number.
    #[display("version string does not start with a number")]
    MissingNumber,
    /// Version component is not a valid number.
    #[display("invalid version component `{component}`")]
    InvalidComponent {
        /// Offending component.
        component: String,
    },
}

/// Parses the numeric prefix of a version string as reported by `SELECT VERSION()`, e.g.
/// `8.0.34-log` or `10.6.12-MariaDB-1:10.6.12+maria~ubu2004`. Missing components are zero.
impl FromStr for ServerVersion {
    type Err = VersionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let numeric_len = raw
            .find(|ch: char| !ch.is_ascii_digit() && ch != '.')
            .unwrap_or(raw.len());
        let numeric = &raw[..numeric_len];
        if !numeric.starts_with(|ch: char| ch.is_ascii_digit()) {
            return Err(VersionParseError::MissingNumber);
        }

        let mut components = [0_u32; 3];
        let numeric = numeric.strip_suffix('.').unwrap_or(numeric);
        for (slot, component) in components.iter_mut().zip(numeric.split('.')) {
            *slot = component
                .parse()
                .map_err(|_| VersionParseError::InvalidComponent {
                    component: component.to_owned(),
                })?;
        }
        let [major, minor, patch] = components;
        Ok(Self::new(major, minor, patch))
    }
}
