use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

/// Version placeholder used when a listing line carries no recognizable versions.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Provenance of a package: core formula, cask, or a third-party tap path.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PackageSource {
    #[default]
    Unresolved,
    Formula,
    Cask,
    Tap(String),
}

impl PackageSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unresolved => "",
            Self::Formula => "formula",
            Self::Cask => "cask",
            Self::Tap(path) => path.as_str(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::Unresolved,
            "formula" => Self::Formula,
            "cask" => Self::Cask,
            other => Self::Tap(other.to_string()),
        }
    }
}

impl Display for PackageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PackageSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One entry of the outdated listing. Identity is the name alone.
#[derive(Clone, Debug, Serialize)]
pub struct OutdatedPackage {
    pub name: String,
    pub current_version: String,
    pub available_version: String,
    pub source: PackageSource,
    #[serde(skip)]
    pub selected: bool,
}

impl OutdatedPackage {
    pub fn new(
        name: impl Into<String>,
        current_version: impl Into<String>,
        available_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            current_version: current_version.into(),
            available_version: available_version.into(),
            source: PackageSource::Unresolved,
            selected: false,
        }
    }

    pub fn unknown_versions(name: impl Into<String>) -> Self {
        Self::new(name, UNKNOWN_VERSION, UNKNOWN_VERSION)
    }

    pub fn with_source(mut self, source: PackageSource) -> Self {
        self.source = source;
        self
    }
}

impl PartialEq for OutdatedPackage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for OutdatedPackage {}

impl Hash for OutdatedPackage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub source: PackageSource,
}

impl PartialEq for InstalledPackage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for InstalledPackage {}

impl Hash for InstalledPackage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::{InstalledPackage, OutdatedPackage, PackageSource};

    #[test]
    fn outdated_identity_ignores_versions_and_source() {
        let first = OutdatedPackage::new("git", "2.44.0", "2.45.1");
        let second =
            OutdatedPackage::new("git", "1.0", "9.9").with_source(PackageSource::Formula);
        assert_eq!(first, second);
        assert_ne!(first, OutdatedPackage::new("gh", "2.44.0", "2.45.1"));
    }

    #[test]
    fn installed_identity_is_name_only() {
        let formula = InstalledPackage {
            name: "wget".to_string(),
            version: "1.24".to_string(),
            source: PackageSource::Formula,
        };
        let cask = InstalledPackage {
            name: "wget".to_string(),
            version: "0.1".to_string(),
            source: PackageSource::Cask,
        };
        assert_eq!(formula, cask);
    }

    #[test]
    fn source_round_trips_through_its_string_form() {
        for source in [
            PackageSource::Unresolved,
            PackageSource::Formula,
            PackageSource::Cask,
            PackageSource::Tap("homebrew/cask-fonts".to_string()),
        ] {
            assert_eq!(PackageSource::parse(source.as_str()), source);
        }
    }
}
