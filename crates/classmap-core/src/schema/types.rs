//! Primitive property types and schema versions.

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primitive property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PrimitiveType {
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Double precision float.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time.
    DateTime,
    /// Raw bytes.
    Binary,
    /// Boolean.
    Boolean,
    /// Two dimensional point, stored as X and Y.
    Point2d,
    /// Three dimensional point, stored as X, Y and Z.
    Point3d,
}

impl PrimitiveType {
    /// Name used for satellite tables of this element type.
    pub fn type_name(&self) -> &'static str {
        match self {
            PrimitiveType::Int32 => "Int32",
            PrimitiveType::Int64 => "Int64",
            PrimitiveType::Double => "Double",
            PrimitiveType::String => "String",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::Binary => "Binary",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Point2d => "Point2d",
            PrimitiveType::Point3d => "Point3d",
        }
    }

    /// Coordinate suffixes of point types; empty for scalars.
    pub fn coordinates(&self) -> &'static [&'static str] {
        match self {
            PrimitiveType::Point2d => &["X", "Y"],
            PrimitiveType::Point3d => &["X", "Y", "Z"],
            _ => &[],
        }
    }

    /// Check if this is a point type.
    pub fn is_point(&self) -> bool {
        !self.coordinates().is_empty()
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Schema version, ordered by major then minor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    /// Major version; a change means an incompatible schema.
    pub major: u32,
    /// Minor version; a higher minor may only add.
    pub minor: u32,
}

impl SchemaVersion {
    /// Create a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("invalid version `{s}`, expected `major.minor`"))?;
        let major = major
            .parse()
            .map_err(|_| format!("invalid major version in `{s}`"))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("invalid minor version in `{s}`"))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(SchemaVersion::new(1, 2) > SchemaVersion::new(1, 1));
        assert!(SchemaVersion::new(2, 0) > SchemaVersion::new(1, 9));
        assert_eq!(SchemaVersion::new(1, 0), SchemaVersion::new(1, 0));
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("1.2".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(1, 2));
        assert_eq!(SchemaVersion::new(3, 10).to_string(), "3.10");
        assert!("1".parse::<SchemaVersion>().is_err());
        assert!("a.b".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_point_coordinates() {
        assert_eq!(PrimitiveType::Point3d.coordinates(), &["X", "Y", "Z"]);
        assert!(PrimitiveType::Point2d.is_point());
        assert!(!PrimitiveType::Double.is_point());
    }
}
