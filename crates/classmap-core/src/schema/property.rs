//! Property definitions.

use super::types::PrimitiveType;
use serde::{Deserialize, Serialize};

/// What a property holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// A single primitive value.
    Primitive {
        /// The value type.
        primitive: PrimitiveType,
    },
    /// An embedded struct value.
    Struct {
        /// Name of the struct class.
        class: String,
    },
    /// An ordered array of primitive values.
    PrimitiveArray {
        /// The element type.
        primitive: PrimitiveType,
    },
    /// An ordered array of struct values.
    StructArray {
        /// Name of the element struct class.
        class: String,
    },
}

/// A property of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name (unique within its class hierarchy).
    pub name: String,
    /// Property kind.
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl PropertyDef {
    /// Create a primitive property.
    pub fn primitive(name: impl Into<String>, primitive: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Primitive { primitive },
        }
    }

    /// Create a struct property.
    pub fn structure(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Struct {
                class: class.into(),
            },
        }
    }

    /// Create a primitive array property.
    pub fn primitive_array(name: impl Into<String>, primitive: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::PrimitiveArray { primitive },
        }
    }

    /// Create a struct array property.
    pub fn struct_array(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::StructArray {
                class: class.into(),
            },
        }
    }

    /// Check if this property is stored in a satellite table.
    pub fn is_array(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::PrimitiveArray { .. } | PropertyKind::StructArray { .. }
        )
    }

    /// The referenced struct class, for struct and struct array properties.
    pub fn struct_class(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Struct { class } | PropertyKind::StructArray { class } => Some(class),
            _ => None,
        }
    }

    /// Short description of the kind, used in diff reports.
    pub fn kind_label(&self) -> String {
        match &self.kind {
            PropertyKind::Primitive { primitive } => primitive.to_string(),
            PropertyKind::Struct { class } => class.clone(),
            PropertyKind::PrimitiveArray { primitive } => format!("{primitive}[]"),
            PropertyKind::StructArray { class } => format!("{class}[]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_json_shape() {
        let json = r#"{"name": "pos", "kind": "primitive", "primitive": "Point3d"}"#;
        let prop: PropertyDef = serde_json::from_str(json).unwrap();
        assert_eq!(prop, PropertyDef::primitive("pos", PrimitiveType::Point3d));

        let json = r#"{"name": "items", "kind": "struct_array", "class": "Item"}"#;
        let prop: PropertyDef = serde_json::from_str(json).unwrap();
        assert!(prop.is_array());
        assert_eq!(prop.struct_class(), Some("Item"));
    }

    #[test]
    fn test_kind_label() {
        assert_eq!(
            PropertyDef::primitive_array("a", PrimitiveType::Int32).kind_label(),
            "Int32[]"
        );
        assert_eq!(PropertyDef::structure("s", "Pt").kind_label(), "Pt");
    }
}
