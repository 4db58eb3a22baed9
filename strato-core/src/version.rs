//! Migration version numbers and planning targets.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A dotted numeric migration version such as `1`, `2.1` or `2024.10.3`.
///
/// Versions are totally ordered by component-wise numeric comparison, with
/// missing trailing components treated as zero (`1.0` equals `1`). The
/// [`empty`](MigrationVersion::empty) sentinel marks a schema with no
/// versioned migration applied yet and precedes every real version.
#[derive(Debug, Clone)]
pub struct MigrationVersion {
    parts: Vec<u64>,
    raw: String,
}

/// Error raised when a version string cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid migration version {raw:?}: {reason}")]
pub struct VersionError {
    pub raw: String,
    pub reason: String,
}

impl MigrationVersion {
    /// The sentinel preceding all real versions.
    pub fn empty() -> Self {
        Self {
            parts: Vec::new(),
            raw: String::new(),
        }
    }

    /// Parse a dotted (or underscore-separated) numeric sequence.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let normalized = raw.replace('_', ".");
        if normalized.is_empty() {
            return Err(VersionError {
                raw: raw.to_owned(),
                reason: "version must not be empty".to_owned(),
            });
        }

        let mut parts = Vec::new();
        for component in normalized.split('.') {
            let value = component.parse::<u64>().map_err(|_| VersionError {
                raw: raw.to_owned(),
                reason: format!("component {component:?} is not a number"),
            })?;
            parts.push(value);
        }

        Ok(Self {
            parts,
            raw: raw.to_owned(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The version string as written by the author, e.g. `2.1`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn normalized(&self) -> &[u64] {
        let mut len = self.parts.len();
        while len > 0 && self.parts[len - 1] == 0 {
            len -= 1;
        }
        &self.parts[..len]
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for MigrationVersion {}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized().cmp(other.normalized())
    }
}

impl std::hash::Hash for MigrationVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<< Empty Schema >>")
        } else {
            f.write_str(&self.raw)
        }
    }
}

impl FromStr for MigrationVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Upper bound for a migration run.
///
/// `Latest`, `Next` and `Current` are planning directives, not versions:
/// they are resolved against the schema state at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Apply every pending migration.
    Latest,
    /// Apply only the next pending migration, then stop.
    Next,
    /// Apply nothing; report against the current version.
    Current,
    /// Apply up to and including this version.
    Version(MigrationVersion),
}

impl Target {
    /// The version bound, if this target names one.
    pub fn version(&self) -> Option<&MigrationVersion> {
        match self {
            Target::Version(version) => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => f.write_str("latest"),
            Target::Next => f.write_str("next"),
            Target::Current => f.write_str("current"),
            Target::Version(version) => version.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_component_wise() {
        let v1 = MigrationVersion::parse("1.2.3").unwrap();
        let v2 = MigrationVersion::parse("1.10").unwrap();
        let v3 = MigrationVersion::parse("2").unwrap();

        assert!(v1 < v2);
        assert!(v2 < v3);
    }

    #[test]
    fn trailing_zeros_do_not_matter() {
        let a = MigrationVersion::parse("1.0").unwrap();
        let b = MigrationVersion::parse("1").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn empty_precedes_everything() {
        let empty = MigrationVersion::empty();
        let one = MigrationVersion::parse("0.1").unwrap();

        assert!(empty < one);
        assert!(empty.is_empty());
    }

    #[test]
    fn accepts_underscores() {
        let a = MigrationVersion::parse("1_2").unwrap();
        let b = MigrationVersion::parse("1.2").unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_numeric_components() {
        assert!(MigrationVersion::parse("1.x").is_err());
        assert!(MigrationVersion::parse("").is_err());
    }

    #[test]
    fn displays_raw_text() {
        let v = MigrationVersion::parse("2.1").unwrap();
        assert_eq!(v.to_string(), "2.1");
        assert_eq!(MigrationVersion::empty().to_string(), "<< Empty Schema >>");
    }
}
