//! Structural schema diffing.
//!
//! Compares two schema definitions and lists the classes, properties and
//! relationship shapes that were added, removed or modified. Independent of
//! the relational mapping; used for reports.

use crate::schema::{
    ClassDef, ClassKind, Direction, PropertyDef, RelationshipClassDef, RelationshipEnd,
    SchemaDef, SchemaVersion, StrategyHint, Strength,
};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Complete diff between two schema definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiff {
    /// Name of the source schema.
    pub schema_name: String,
    /// Source schema version.
    pub from_version: SchemaVersion,
    /// Target schema version.
    pub to_version: SchemaVersion,
    /// Alias change, if any.
    pub alias_changed: Option<(String, String)>,
    /// Changes to classes.
    pub class_changes: Vec<ClassChange>,
    /// Changes to relationship classes.
    pub relationship_changes: Vec<RelationshipChange>,
}

/// A change to a class.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassChange {
    /// A new class was added.
    Added(ClassDef),
    /// A class was removed.
    Removed(ClassDef),
    /// A class was modified.
    Modified {
        /// Name of the modified class.
        class_name: String,
        /// Property changes.
        property_changes: Vec<PropertyChange>,
        /// Kind change (from, to).
        kind_changed: Option<(ClassKind, ClassKind)>,
        /// Base class change (from, to).
        base_changed: Option<(Option<String>, Option<String>)>,
        /// Strategy hint change (from, to).
        strategy_changed: Option<(Option<StrategyHint>, Option<StrategyHint>)>,
    },
}

/// A change to a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    /// A new property was added.
    Added(PropertyDef),
    /// A property was removed.
    Removed(PropertyDef),
    /// A property's kind changed.
    KindChanged {
        property_name: String,
        from: PropertyDef,
        to: PropertyDef,
    },
    /// A property moved within the declaration order.
    Moved {
        property_name: String,
        from_index: usize,
        to_index: usize,
    },
}

/// A change to a relationship class.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipChange {
    /// A new relationship was added.
    Added(RelationshipClassDef),
    /// A relationship was removed.
    Removed(RelationshipClassDef),
    /// A relationship's shape changed.
    Modified {
        /// Name of the modified relationship.
        relationship_name: String,
        source_changed: Option<(RelationshipEnd, RelationshipEnd)>,
        target_changed: Option<(RelationshipEnd, RelationshipEnd)>,
        strength_changed: Option<(Strength, Strength)>,
        direction_changed: Option<(Direction, Direction)>,
    },
}

impl SchemaDiff {
    /// Compute the diff between two schema definitions.
    pub fn compute(from: &SchemaDef, to: &SchemaDef) -> Self {
        let alias_changed = if from.alias != to.alias {
            Some((from.alias.clone(), to.alias.clone()))
        } else {
            None
        };

        SchemaDiff {
            schema_name: from.name.clone(),
            from_version: from.version,
            to_version: to.version,
            alias_changed,
            class_changes: Self::diff_classes(&from.classes, &to.classes),
            relationship_changes: Self::diff_relationships(&from.relationships, &to.relationships),
        }
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.alias_changed.is_none()
            && self.class_changes.is_empty()
            && self.relationship_changes.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        usize::from(self.alias_changed.is_some())
            + self.class_changes.len()
            + self.relationship_changes.len()
    }

    fn diff_classes(from: &[ClassDef], to: &[ClassDef]) -> Vec<ClassChange> {
        let mut changes = Vec::new();

        let from_map: HashMap<_, _> = from.iter().map(|c| (c.name.as_str(), c)).collect();
        let to_names: HashSet<_> = to.iter().map(|c| c.name.as_str()).collect();

        // Added classes, in target declaration order
        for class in to.iter().filter(|c| !from_map.contains_key(c.name.as_str())) {
            changes.push(ClassChange::Added(class.clone()));
        }

        for from_class in from {
            if !to_names.contains(from_class.name.as_str()) {
                changes.push(ClassChange::Removed(from_class.clone()));
            }
        }

        for to_class in to {
            let Some(from_class) = from_map.get(to_class.name.as_str()) else {
                continue;
            };
            if *from_class == to_class {
                continue;
            }

            let property_changes = Self::diff_properties(&from_class.properties, &to_class.properties);
            let kind_changed =
                (from_class.kind != to_class.kind).then_some((from_class.kind, to_class.kind));
            let base_changed = (from_class.base != to_class.base)
                .then(|| (from_class.base.clone(), to_class.base.clone()));
            let strategy_changed = (from_class.strategy != to_class.strategy)
                .then_some((from_class.strategy, to_class.strategy));

            if !property_changes.is_empty()
                || kind_changed.is_some()
                || base_changed.is_some()
                || strategy_changed.is_some()
            {
                changes.push(ClassChange::Modified {
                    class_name: to_class.name.clone(),
                    property_changes,
                    kind_changed,
                    base_changed,
                    strategy_changed,
                });
            }
        }

        changes
    }

    fn diff_properties(from: &[PropertyDef], to: &[PropertyDef]) -> Vec<PropertyChange> {
        let mut changes = Vec::new();

        let from_map: HashMap<_, _> = from
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), (i, p)))
            .collect();
        let to_names: HashSet<_> = to.iter().map(|p| p.name.as_str()).collect();

        for (to_index, prop) in to.iter().enumerate() {
            match from_map.get(prop.name.as_str()) {
                None => changes.push(PropertyChange::Added(prop.clone())),
                Some((from_index, old)) => {
                    if old.kind != prop.kind {
                        changes.push(PropertyChange::KindChanged {
                            property_name: prop.name.clone(),
                            from: (*old).clone(),
                            to: prop.clone(),
                        });
                    }
                    if *from_index != to_index {
                        changes.push(PropertyChange::Moved {
                            property_name: prop.name.clone(),
                            from_index: *from_index,
                            to_index,
                        });
                    }
                }
            }
        }

        for prop in from {
            if !to_names.contains(prop.name.as_str()) {
                changes.push(PropertyChange::Removed(prop.clone()));
            }
        }

        changes
    }

    fn diff_relationships(
        from: &[RelationshipClassDef],
        to: &[RelationshipClassDef],
    ) -> Vec<RelationshipChange> {
        let mut changes = Vec::new();
        let from_map: HashMap<_, _> = from.iter().map(|r| (r.name.as_str(), r)).collect();
        let to_names: HashSet<_> = to.iter().map(|r| r.name.as_str()).collect();

        for rel in to {
            let Some(old) = from_map.get(rel.name.as_str()) else {
                changes.push(RelationshipChange::Added(rel.clone()));
                continue;
            };
            if *old == rel {
                continue;
            }
            changes.push(RelationshipChange::Modified {
                relationship_name: rel.name.clone(),
                source_changed: (old.source != rel.source)
                    .then(|| (old.source.clone(), rel.source.clone())),
                target_changed: (old.target != rel.target)
                    .then(|| (old.target.clone(), rel.target.clone())),
                strength_changed: (old.strength != rel.strength)
                    .then_some((old.strength, rel.strength)),
                direction_changed: (old.direction != rel.direction)
                    .then_some((old.direction, rel.direction)),
            });
        }

        for rel in from {
            if !to_names.contains(rel.name.as_str()) {
                changes.push(RelationshipChange::Removed(rel.clone()));
            }
        }

        changes
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "schema {}: {} -> {} ({} changes)",
            self.schema_name,
            self.from_version,
            self.to_version,
            self.change_count()
        )?;
        if let Some((from, to)) = &self.alias_changed {
            writeln!(f, "  ~ alias {from} -> {to}")?;
        }
        for change in &self.class_changes {
            match change {
                ClassChange::Added(class) => writeln!(f, "  + class {} ({})", class.name, class.kind)?,
                ClassChange::Removed(class) => writeln!(f, "  - class {}", class.name)?,
                ClassChange::Modified {
                    class_name,
                    property_changes,
                    kind_changed,
                    base_changed,
                    strategy_changed,
                } => {
                    writeln!(f, "  ~ class {class_name}")?;
                    if let Some((from, to)) = kind_changed {
                        writeln!(f, "      kind {from} -> {to}")?;
                    }
                    if let Some((from, to)) = base_changed {
                        writeln!(
                            f,
                            "      base {} -> {}",
                            from.as_deref().unwrap_or("(none)"),
                            to.as_deref().unwrap_or("(none)")
                        )?;
                    }
                    if let Some((from, to)) = strategy_changed {
                        writeln!(f, "      strategy {from:?} -> {to:?}")?;
                    }
                    for pc in property_changes {
                        match pc {
                            PropertyChange::Added(p) => {
                                writeln!(f, "      + {}: {}", p.name, p.kind_label())?
                            }
                            PropertyChange::Removed(p) => writeln!(f, "      - {}", p.name)?,
                            PropertyChange::KindChanged {
                                property_name,
                                from,
                                to,
                            } => writeln!(
                                f,
                                "      ~ {property_name}: {} -> {}",
                                from.kind_label(),
                                to.kind_label()
                            )?,
                            PropertyChange::Moved {
                                property_name,
                                from_index,
                                to_index,
                            } => writeln!(
                                f,
                                "      ~ {property_name} moved {from_index} -> {to_index}"
                            )?,
                        }
                    }
                }
            }
        }
        for change in &self.relationship_changes {
            match change {
                RelationshipChange::Added(rel) => writeln!(
                    f,
                    "  + relationship {}: {} -> {}",
                    rel.name, rel.source, rel.target
                )?,
                RelationshipChange::Removed(rel) => writeln!(f, "  - relationship {}", rel.name)?,
                RelationshipChange::Modified {
                    relationship_name,
                    source_changed,
                    target_changed,
                    strength_changed,
                    direction_changed,
                } => {
                    writeln!(f, "  ~ relationship {relationship_name}")?;
                    if let Some((from, to)) = source_changed {
                        writeln!(f, "      source {from} -> {to}")?;
                    }
                    if let Some((from, to)) = target_changed {
                        writeln!(f, "      target {from} -> {to}")?;
                    }
                    if let Some((from, to)) = strength_changed {
                        writeln!(f, "      strength {from:?} -> {to:?}")?;
                    }
                    if let Some((from, to)) = direction_changed {
                        writeln!(f, "      direction {from:?} -> {to:?}")?;
                    }
                }
            }
        }
        Ok(())
    }
}
