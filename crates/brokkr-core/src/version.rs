//! Dotted-numeric addin versions
//!
//! Addin versions are dotted sequences of non-negative integers with any
//! number of components. Missing trailing components compare as zero, so
//! "1.0" and "1.0.0" are the same version. This is deliberately not semver:
//! four-component versions like "1.0.2.3" are common in addin manifests.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A dotted-numeric version such as "1.0" or "2.4.1.7".
///
/// The default value is the all-zero version, used when a manifest declares
/// no version at all.
#[derive(Debug, Clone, Default)]
pub struct AddinVersion {
    parts: Vec<u64>,
}

impl AddinVersion {
    /// Parse a dotted-numeric version string
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_version(input));
        }
        let mut parts = Vec::new();
        for piece in trimmed.split('.') {
            let value: u64 = piece
                .parse()
                .map_err(|_| Error::invalid_version(input))?;
            parts.push(value);
        }
        Ok(Self { parts })
    }

    /// The all-zero version
    pub fn zero() -> Self {
        Self::default()
    }

    /// True if every component is zero
    pub fn is_zero(&self) -> bool {
        self.parts.iter().all(|p| *p == 0)
    }

    /// Components with trailing zeros trimmed; equality and hashing use this
    fn normalized(&self) -> &[u64] {
        let mut len = self.parts.len();
        while len > 0 && self.parts[len - 1] == 0 {
            len -= 1;
        }
        &self.parts[..len]
    }

    /// Check whether a dependency requiring `required` is satisfied by an
    /// addin at this version with an optional compatibility floor.
    ///
    /// The required version must lie in the half-open interval
    /// [compat_version, version]; with no floor, any required version up to
    /// and including this one is accepted.
    pub fn satisfies(&self, compat: Option<&AddinVersion>, required: &AddinVersion) -> bool {
        if required > self {
            return false;
        }
        match compat {
            Some(floor) => floor <= required,
            None => true,
        }
    }
}

impl PartialEq for AddinVersion {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for AddinVersion {}

impl Hash for AddinVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl Ord for AddinVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for AddinVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AddinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "0");
        }
        let rendered: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl FromStr for AddinVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for AddinVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AddinVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v = AddinVersion::parse("1.0.2.3").unwrap();
        assert_eq!(v.to_string(), "1.0.2.3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AddinVersion::parse("").is_err());
        assert!(AddinVersion::parse("1.a").is_err());
        assert!(AddinVersion::parse("1..2").is_err());
        assert!(AddinVersion::parse("-1.0").is_err());
    }

    #[test]
    fn test_trailing_zeros_equal() {
        let a = AddinVersion::parse("1.0").unwrap();
        let b = AddinVersion::parse("1.0.0").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ordering() {
        let v10 = AddinVersion::parse("1.0").unwrap();
        let v101 = AddinVersion::parse("1.0.1").unwrap();
        let v2 = AddinVersion::parse("2.0").unwrap();
        assert!(v10 < v101);
        assert!(v101 < v2);
        assert!(AddinVersion::zero() < v10);
    }

    #[test]
    fn test_satisfies_interval() {
        let version = AddinVersion::parse("2.0").unwrap();
        let compat = AddinVersion::parse("1.5").unwrap();

        let required = AddinVersion::parse("1.7").unwrap();
        assert!(version.satisfies(Some(&compat), &required));

        // Below the compatibility floor
        let required = AddinVersion::parse("1.0").unwrap();
        assert!(!version.satisfies(Some(&compat), &required));

        // Above the declared version
        let required = AddinVersion::parse("2.1").unwrap();
        assert!(!version.satisfies(Some(&compat), &required));

        // No floor accepts anything up to the declared version
        let required = AddinVersion::parse("0.1").unwrap();
        assert!(version.satisfies(None, &required));
    }

    #[test]
    fn test_serde_round_trip() {
        let v = AddinVersion::parse("1.2.3").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.2.3\"");
        let back: AddinVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
