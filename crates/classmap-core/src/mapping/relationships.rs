//! Relationship mapping: foreign key columns or link tables.

use super::naming::{link_table_name, EndRole, ForeignKeyNaming};
use super::resolver::ResolvedStrategy;
use super::table::{
    ColumnDef, ColumnRole, MappedTable, SqlKind, TableKind, SOURCE_CLASS_ID_COLUMN,
    SOURCE_ID_COLUMN, TARGET_CLASS_ID_COLUMN, TARGET_ID_COLUMN,
};
use crate::error::{Error, Result};
use crate::schema::{Direction, Multiplicity, RelationshipClassDef, RelationshipEnd, SchemaDef};
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How a relationship is stored.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum RelationshipMapping {
    /// A nullable key column in the tables of the referencing class.
    ForeignKey {
        relationship: String,
        /// Tables that carry the column.
        tables: Vec<String>,
        column: String,
        /// Class the key points at.
        referenced_class: String,
    },
    /// A dedicated table holding one row per relationship instance.
    LinkTable {
        relationship: String,
        table: String,
        source_column: String,
        target_column: String,
        source_class_column: Option<String>,
        target_class_column: Option<String>,
    },
}

impl RelationshipMapping {
    /// The relationship's name.
    pub fn relationship(&self) -> &str {
        match self {
            RelationshipMapping::ForeignKey { relationship, .. }
            | RelationshipMapping::LinkTable { relationship, .. } => relationship,
        }
    }
}

/// Result of mapping one relationship.
#[derive(Debug)]
pub struct MappedRelationship {
    /// How the relationship is stored, as recorded in the catalog.
    pub mapping: RelationshipMapping,
    /// Foreign key columns to append, keyed by table.
    pub foreign_keys: Vec<(String, ColumnDef)>,
    /// The link table to create, for link-table relationships.
    pub link_table: Option<MappedTable>,
}

/// Maps relationships of one schema, numbering foreign keys per table and class.
///
/// Relationships found in a recorded mapping keep their catalogued key column;
/// new ones are numbered past every name already taken in their tables.
pub struct RelationshipMapper<'a> {
    schema: &'a SchemaDef,
    strategies: &'a HashMap<String, ResolvedStrategy>,
    naming: ForeignKeyNaming,
    recorded: &'a [RelationshipMapping],
    ordinals: HashMap<(String, String), u32>,
    // (table, column) pairs holding a key.
    taken: HashSet<(String, String)>,
}

impl<'a> RelationshipMapper<'a> {
    /// Create a mapper over resolved class strategies.
    pub fn new(
        schema: &'a SchemaDef,
        strategies: &'a HashMap<String, ResolvedStrategy>,
        naming: ForeignKeyNaming,
    ) -> Self {
        Self {
            schema,
            strategies,
            naming,
            recorded: &[],
            ordinals: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    /// Hold foreign keys to previously catalogued relationship mappings.
    pub fn with_recorded(mut self, recorded: &'a [RelationshipMapping]) -> Self {
        self.recorded = recorded;
        for mapping in recorded {
            if let RelationshipMapping::ForeignKey { tables, column, .. } = mapping {
                for table in tables {
                    self.taken.insert((table.clone(), column.clone()));
                }
            }
        }
        self
    }

    /// Map a relationship. Call in declaration order; foreign key ordinals depend on it.
    pub fn map(&mut self, rel: &RelationshipClassDef) -> Result<MappedRelationship> {
        self.check_end(rel, "source", &rel.source)?;
        self.check_end(rel, "target", &rel.target)?;

        let source_poly = self.is_polymorphic(&rel.source);
        let target_poly = self.is_polymorphic(&rel.target);

        // (class holding the key, referenced end, role of the referenced end)
        let key_holder = match (rel.source.multiplicity, rel.target.multiplicity) {
            (Multiplicity::Many, Multiplicity::Many) => None,
            (Multiplicity::Many, Multiplicity::One) if !target_poly => {
                Some((&rel.source, &rel.target, EndRole::Target))
            }
            (Multiplicity::One, Multiplicity::Many) if !source_poly => {
                Some((&rel.target, &rel.source, EndRole::Source))
            }
            (Multiplicity::One, Multiplicity::One) => match rel.direction {
                Direction::Forward if !source_poly => Some((&rel.target, &rel.source, EndRole::Source)),
                Direction::Backward if !target_poly => {
                    Some((&rel.source, &rel.target, EndRole::Target))
                }
                _ => None,
            },
            _ => None,
        };

        match key_holder {
            Some((holder, referenced, role)) => self.foreign_key(rel, holder, referenced, role),
            None => Ok(self.link_table(rel, source_poly, target_poly)),
        }
    }

    fn check_end(&self, rel: &RelationshipClassDef, which: &str, end: &RelationshipEnd) -> Result<()> {
        let is_entity = self
            .schema
            .get_class(&end.class)
            .is_some_and(|c| c.is_entity());
        let stored = self
            .strategies
            .get(&end.class)
            .is_some_and(ResolvedStrategy::is_stored);
        if is_entity && stored {
            return Ok(());
        }
        Err(Error::invalid(
            &rel.name,
            format!("{which} class {} is not a mapped entity", end.class),
        ))
    }

    /// An end is polymorphic when flagged so and its class has entity subclasses.
    pub fn is_polymorphic(&self, end: &RelationshipEnd) -> bool {
        end.polymorphic && self.schema.has_entity_subclasses(&end.class)
    }

    fn foreign_key(
        &mut self,
        rel: &RelationshipClassDef,
        holder: &RelationshipEnd,
        referenced: &RelationshipEnd,
        role: EndRole,
    ) -> Result<MappedRelationship> {
        let tables = self.tables_of(&holder.class);
        if tables.is_empty() {
            return Err(Error::invalid(
                &rel.name,
                format!("class {} has no table to hold the key", holder.class),
            ));
        }

        let column = match self.recorded_column(&rel.name, &referenced.class) {
            Some(column) => column,
            None => self.next_column(&tables, &referenced.class, role),
        };
        for table in &tables {
            self.taken.insert((table.clone(), column.clone()));
        }

        let foreign_keys = tables
            .iter()
            .map(|t| (t.clone(), ColumnDef::foreign_key(&column, &rel.name)))
            .collect();

        Ok(MappedRelationship {
            mapping: RelationshipMapping::ForeignKey {
                relationship: rel.name.clone(),
                tables,
                column,
                referenced_class: referenced.class.clone(),
            },
            foreign_keys,
            link_table: None,
        })
    }

    fn recorded_column(&self, relationship: &str, referenced_class: &str) -> Option<String> {
        self.recorded.iter().find_map(|mapping| match mapping {
            RelationshipMapping::ForeignKey {
                relationship: name,
                column,
                referenced_class: class,
                ..
            } if name == relationship && class == referenced_class => Some(column.clone()),
            _ => None,
        })
    }

    fn next_column(&mut self, tables: &[String], referenced_class: &str, role: EndRole) -> String {
        let mut ordinal = tables
            .iter()
            .map(|t| {
                self.ordinals
                    .get(&(t.clone(), referenced_class.to_string()))
                    .copied()
                    .unwrap_or(0)
            })
            .max()
            .unwrap_or(0)
            + 1;
        let mut column = self.naming.column_name(referenced_class, role, ordinal);
        while tables
            .iter()
            .any(|t| self.taken.contains(&(t.clone(), column.clone())))
        {
            ordinal += 1;
            column = self.naming.column_name(referenced_class, role, ordinal);
        }
        for table in tables {
            self.ordinals
                .insert((table.clone(), referenced_class.to_string()), ordinal);
        }
        column
    }

    fn link_table(&self, rel: &RelationshipClassDef, source_poly: bool, target_poly: bool) -> MappedRelationship {
        let name = link_table_name(&self.schema.alias, &rel.name);
        let mut table = MappedTable::new(&name, TableKind::Link, &rel.name)
            .with_column(ColumnDef::instance_id())
            .with_column(ColumnDef::system(
                SOURCE_ID_COLUMN,
                ColumnRole::LinkSource,
                SqlKind::BigInt,
            ));
        if source_poly {
            table = table.with_column(ColumnDef::system(
                SOURCE_CLASS_ID_COLUMN,
                ColumnRole::LinkSourceClass,
                SqlKind::BigInt,
            ));
        }
        table = table.with_column(ColumnDef::system(
            TARGET_ID_COLUMN,
            ColumnRole::LinkTarget,
            SqlKind::BigInt,
        ));
        if target_poly {
            table = table.with_column(ColumnDef::system(
                TARGET_CLASS_ID_COLUMN,
                ColumnRole::LinkTargetClass,
                SqlKind::BigInt,
            ));
        }

        MappedRelationship {
            mapping: RelationshipMapping::LinkTable {
                relationship: rel.name.clone(),
                table: name,
                source_column: SOURCE_ID_COLUMN.to_string(),
                target_column: TARGET_ID_COLUMN.to_string(),
                source_class_column: source_poly.then(|| SOURCE_CLASS_ID_COLUMN.to_string()),
                target_class_column: target_poly.then(|| TARGET_CLASS_ID_COLUMN.to_string()),
            },
            foreign_keys: Vec::new(),
            link_table: Some(table),
        }
    }

    /// The class's table followed by tables of descendants stored separately.
    fn tables_of(&self, class: &str) -> Vec<String> {
        let mut tables = Vec::new();
        self.collect_tables(class, &mut tables);
        tables
    }

    fn collect_tables(&self, class: &str, tables: &mut Vec<String>) {
        if let Some(table) = self.strategies.get(class).and_then(|s| s.table.as_ref()) {
            if !tables.contains(table) {
                tables.push(table.clone());
            }
        }
        for sub in self.schema.subclasses(class).filter(|c| c.is_entity()) {
            self.collect_tables(&sub.name, tables);
        }
    }
}
