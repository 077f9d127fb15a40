//! Class definitions.

use super::property::PropertyDef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    /// Has identity; stored in tables.
    Entity,
    /// Value type embedded in its owner.
    Struct,
    /// Metadata only; never stored.
    CustomAttribute,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassKind::Entity => write!(f, "entity"),
            ClassKind::Struct => write!(f, "struct"),
            ClassKind::CustomAttribute => write!(f, "custom attribute"),
        }
    }
}

/// Author-supplied mapping hint on a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyHint {
    /// Store this class and its subclasses in one table with a discriminator.
    SharedHierarchyTable,
    /// Store this class in a table of its own.
    OwnTablePerClass,
    /// Do not store this class.
    NotMapped,
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Class name (unique within the schema).
    pub name: String,
    /// Class kind.
    pub kind: ClassKind,
    /// Base class name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Properties declared by this class, in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Mapping hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyHint>,
}

impl ClassDef {
    fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base: None,
            properties: Vec::new(),
            strategy: None,
        }
    }

    /// Create an entity class.
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Entity)
    }

    /// Create a struct class.
    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Struct)
    }

    /// Create a custom attribute class.
    pub fn custom_attribute(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::CustomAttribute)
    }

    /// Set the base class.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Add a property.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Add multiple properties.
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = PropertyDef>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Set the mapping hint.
    pub fn with_strategy(mut self, hint: StrategyHint) -> Self {
        self.strategy = Some(hint);
        self
    }

    /// Get a declared property by name.
    pub fn get_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Check if this class is an entity.
    pub fn is_entity(&self) -> bool {
        self.kind == ClassKind::Entity
    }

    /// Check if this class is a struct.
    pub fn is_struct(&self) -> bool {
        self.kind == ClassKind::Struct
    }
}
