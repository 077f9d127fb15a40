//! Relationship class definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How many instances an end admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// At most one instance.
    One,
    /// Any number of instances.
    Many,
}

/// One end of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEnd {
    /// Entity class at this end.
    pub class: String,
    /// Multiplicity of this end.
    pub multiplicity: Multiplicity,
    /// Whether subclasses of `class` may appear at this end.
    #[serde(default)]
    pub polymorphic: bool,
}

impl RelationshipEnd {
    /// An end admitting at most one instance.
    pub fn one(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            multiplicity: Multiplicity::One,
            polymorphic: false,
        }
    }

    /// An end admitting many instances.
    pub fn many(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            multiplicity: Multiplicity::Many,
            polymorphic: false,
        }
    }

    /// Mark this end polymorphic.
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }
}

impl fmt::Display for RelationshipEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mult = match self.multiplicity {
            Multiplicity::One => "1",
            Multiplicity::Many => "*",
        };
        write!(f, "{} ({}", self.class, mult)?;
        if self.polymorphic {
            write!(f, ", polymorphic")?;
        }
        write!(f, ")")
    }
}

/// Lifetime coupling between the ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strength {
    /// Independent lifetimes.
    #[default]
    Referencing,
    /// Source holds the target.
    Holding,
    /// Target is owned by the source.
    Embedding,
}

/// Which end drives the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Source to target.
    #[default]
    Forward,
    /// Target to source.
    Backward,
}

/// A relationship class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipClassDef {
    /// Relationship name (unique within the schema).
    pub name: String,
    /// Source end.
    pub source: RelationshipEnd,
    /// Target end.
    pub target: RelationshipEnd,
    /// Strength.
    #[serde(default)]
    pub strength: Strength,
    /// Direction.
    #[serde(default)]
    pub direction: Direction,
}

impl RelationshipClassDef {
    /// Create a relationship between two ends.
    pub fn new(name: impl Into<String>, source: RelationshipEnd, target: RelationshipEnd) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            strength: Strength::default(),
            direction: Direction::default(),
        }
    }

    /// One source instance related to many target instances.
    pub fn one_to_many(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationshipEnd::one(source), RelationshipEnd::many(target))
    }

    /// Many instances on both ends.
    pub fn many_to_many(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationshipEnd::many(source), RelationshipEnd::many(target))
    }

    /// Set the strength.
    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    /// Set the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}
