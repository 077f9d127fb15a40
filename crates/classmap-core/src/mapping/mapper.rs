//! Whole-schema mapping.

use super::arrays::ArrayTableBuilder;
use super::columns::{ArrayPath, ColumnSet, ColumnSynthesizer};
use super::naming::{ColumnRenames, ForeignKeyNaming};
use super::relationships::{RelationshipMapper, RelationshipMapping};
use super::resolver::{ClassMapping, MappingStrategy, ResolvedStrategy, StrategyResolver};
use super::table::{MappedTable, TableKind};
use crate::catalog::CatalogEntry;
use crate::error::{Error, Result};
use crate::schema::{ClassDef, SchemaDef, SchemaVersion};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

static NO_RENAMES: ColumnRenames = ColumnRenames::new();

/// The relational projection of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    /// Name of the mapped schema.
    pub schema_name: String,
    /// Table name prefix.
    pub alias: String,
    /// Version of the mapped schema.
    pub version: SchemaVersion,
    /// Class strategies in declaration order.
    pub classes: Vec<ClassMapping>,
    /// Class tables, then satellites, then link tables.
    pub tables: Vec<MappedTable>,
    /// Relationship mappings in declaration order.
    pub relationships: Vec<RelationshipMapping>,
    /// Every array property path, in discovery order.
    pub array_paths: Vec<ArrayPath>,
}

impl SchemaMapping {
    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&MappedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Get a class's mapping.
    pub fn class(&self, name: &str) -> Option<&ClassMapping> {
        self.classes.iter().find(|c| c.class == name)
    }

    /// Table names in creation order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

// Classes connected through inheritance, struct references or relationships.
#[derive(Debug)]
struct Component {
    classes: Vec<usize>,
    relationships: Vec<usize>,
}

// Output of mapping one component, keyed by declaration index for merging.
#[derive(Debug, Default)]
struct PartialMapping {
    classes: Vec<(usize, ClassMapping)>,
    class_tables: Vec<(usize, MappedTable)>,
    array_tables: Vec<MappedTable>,
    link_tables: Vec<(usize, MappedTable)>,
    relationships: Vec<(usize, RelationshipMapping)>,
    array_paths: Vec<ArrayPath>,
}

/// Projects a schema onto tables and columns.
pub struct SchemaMapper<'a> {
    schema: &'a SchemaDef,
    renames: &'a ColumnRenames,
    fk_naming: ForeignKeyNaming,
    parallel: bool,
    validate: bool,
    recorded: Option<&'a CatalogEntry>,
}

impl<'a> SchemaMapper<'a> {
    /// Create a mapper with default options.
    pub fn new(schema: &'a SchemaDef) -> Self {
        Self {
            schema,
            renames: &NO_RENAMES,
            fk_naming: ForeignKeyNaming::default(),
            parallel: true,
            validate: true,
            recorded: None,
        }
    }

    /// Use column rename overrides.
    pub fn with_renames(mut self, renames: &'a ColumnRenames) -> Self {
        self.renames = renames;
        self
    }

    /// Use a foreign key naming policy.
    pub fn with_fk_naming(mut self, naming: ForeignKeyNaming) -> Self {
        self.fk_naming = naming;
        self
    }

    /// Map independent class groups on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validate the schema before mapping (on by default). Callers that already
    /// ran [`SchemaDef::validate`] may turn it off.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Hold strategies and foreign keys to a previously catalogued mapping.
    pub fn with_recorded(mut self, recorded: Option<&'a CatalogEntry>) -> Self {
        self.recorded = recorded;
        self
    }

    /// Map the whole schema, reporting every issue found.
    #[instrument(skip_all, fields(schema = %self.schema.name, version = %self.schema.version))]
    pub fn map(&self) -> Result<SchemaMapping> {
        if self.validate {
            self.schema.validate()?;
        }

        let components = self.components();
        debug!(
            components = components.len(),
            parallel = self.parallel,
            "mapping class groups"
        );

        let partials: Vec<Result<PartialMapping>> = if self.parallel && components.len() > 1 {
            components
                .par_iter()
                .map(|c| self.map_component(c))
                .collect()
        } else {
            components.iter().map(|c| self.map_component(c)).collect()
        };

        let mut issues = Vec::new();
        let mut ok = Vec::with_capacity(partials.len());
        for partial in partials {
            match partial {
                Ok(p) => ok.push(p),
                Err(e) => issues.extend(e.into_issues()),
            }
        }
        Error::from_issues(issues)?;

        self.merge(ok)
    }

    fn components(&self) -> Vec<Component> {
        let classes = &self.schema.classes;
        let index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();
        let mut parent: Vec<usize> = (0..classes.len()).collect();

        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }
        fn union(parent: &mut [usize], a: usize, b: usize) {
            let (ra, rb) = (find(parent, a), find(parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        for (i, class) in classes.iter().enumerate() {
            let linked = class
                .base
                .iter()
                .map(String::as_str)
                .chain(class.properties.iter().filter_map(|p| p.struct_class()));
            for other in linked {
                if let Some(&j) = index.get(other) {
                    union(&mut parent, i, j);
                }
            }
        }
        for rel in &self.schema.relationships {
            if let (Some(&s), Some(&t)) = (
                index.get(rel.source.class.as_str()),
                index.get(rel.target.class.as_str()),
            ) {
                union(&mut parent, s, t);
            }
        }

        let mut by_root: Vec<Option<usize>> = vec![None; classes.len()];
        let mut components: Vec<Component> = Vec::new();
        for i in 0..classes.len() {
            let root = find(&mut parent, i);
            let slot = match by_root[root] {
                Some(slot) => slot,
                None => {
                    components.push(Component {
                        classes: Vec::new(),
                        relationships: Vec::new(),
                    });
                    by_root[root] = Some(components.len() - 1);
                    components.len() - 1
                }
            };
            components[slot].classes.push(i);
        }
        for (r, rel) in self.schema.relationships.iter().enumerate() {
            if let Some(&s) = index.get(rel.source.class.as_str()) {
                let root = find(&mut parent, s);
                if let Some(slot) = by_root[root] {
                    components[slot].relationships.push(r);
                }
            }
        }
        components
    }

    fn map_component(&self, component: &Component) -> Result<PartialMapping> {
        let schema = self.schema;
        let mut issues = Vec::new();

        let mut resolver = StrategyResolver::new(schema, self.recorded);
        for &i in &component.classes {
            if let Err(e) = resolver.resolve(&schema.classes[i].name) {
                issues.push(e);
            }
        }
        Error::from_issues(issues.drain(..).collect())?;
        let strategies = resolver.into_resolved();

        let mut partial = PartialMapping::default();
        for &i in &component.classes {
            let class = &schema.classes[i];
            if let Some(resolved) = strategies.get(&class.name) {
                partial.classes.push((
                    i,
                    ClassMapping {
                        class: class.name.clone(),
                        strategy: resolved.strategy,
                        table: resolved.table.clone(),
                    },
                ));
            }
        }

        let synthesizer = ColumnSynthesizer::new(schema, self.renames);
        let mut sets: Vec<(usize, ColumnSet)> = Vec::new();
        let mut arrays = Vec::new();
        for &i in &component.classes {
            let class = &schema.classes[i];
            let Some(resolved) = strategies.get(&class.name) else {
                continue;
            };
            if !resolved.owns_table(&class.name) {
                continue;
            }
            let Some(table) = resolved.table.as_deref() else {
                continue;
            };
            let set = self.class_columns(class, resolved, table, &strategies, &synthesizer, &mut arrays, &mut issues);
            sets.push((i, set));
        }

        let mut array_builder = ArrayTableBuilder::new(&schema.alias, &synthesizer);
        if let Err(e) = array_builder.add(arrays) {
            issues.extend(e.into_issues());
        }

        let recorded = self.recorded.map_or(&[][..], |e| e.relationships.as_slice());
        let mut relationship_mapper =
            RelationshipMapper::new(schema, &strategies, self.fk_naming).with_recorded(recorded);
        for &r in &component.relationships {
            let rel = &schema.relationships[r];
            match relationship_mapper.map(rel) {
                Ok(mapped) => {
                    for (table, column) in mapped.foreign_keys {
                        match sets.iter_mut().find(|(_, s)| s.table() == table) {
                            Some((_, set)) => {
                                if let Err(e) = set.push_system(column) {
                                    issues.push(e);
                                }
                            }
                            None => issues.push(Error::invalid(
                                &rel.name,
                                format!("key table {table} is not mapped"),
                            )),
                        }
                    }
                    if let Some(link) = mapped.link_table {
                        partial.link_tables.push((r, link));
                    }
                    partial.relationships.push((r, mapped.mapping));
                }
                Err(e) => issues.push(e),
            }
        }

        Error::from_issues(issues)?;

        for (i, set) in sets {
            let class = &schema.classes[i];
            let table = MappedTable {
                name: set.table().to_string(),
                kind: TableKind::Class,
                owner: class.name.clone(),
                columns: set.into_columns(),
            };
            debug!(table = %table.name, columns = table.columns.len(), "built class table");
            partial.class_tables.push((i, table));
        }
        let (array_tables, array_paths) = array_builder.finish();
        partial.array_tables = array_tables;
        partial.array_paths = array_paths;
        Ok(partial)
    }

    #[allow(clippy::too_many_arguments)]
    fn class_columns(
        &self,
        class: &ClassDef,
        resolved: &ResolvedStrategy,
        table: &str,
        strategies: &HashMap<String, ResolvedStrategy>,
        synthesizer: &ColumnSynthesizer<'_>,
        arrays: &mut Vec<ArrayPath>,
        issues: &mut Vec<Error>,
    ) -> ColumnSet {
        let shared = resolved.strategy == MappingStrategy::SharedHierarchyTable;
        let mut set = ColumnSet::class_table(table, shared);

        let mut contributors: Vec<&ClassDef> = match self.schema.base_chain(&class.name) {
            Ok(chain) => chain,
            Err(e) => {
                issues.push(e);
                return set;
            }
        };
        if shared {
            self.sharing_descendants(&class.name, table, strategies, &mut contributors);
        }

        for contributor in contributors {
            match synthesizer.flatten_class(contributor) {
                Ok(flat) => {
                    for column in flat.columns {
                        if let Err(e) = set.push(&contributor.name, column) {
                            issues.push(e);
                        }
                    }
                    arrays.extend(flat.arrays);
                }
                Err(e) => issues.extend(e.into_issues()),
            }
        }
        set
    }

    // Depth-first, declaration-ordered subclasses stored in `table`.
    fn sharing_descendants(
        &self,
        class: &str,
        table: &str,
        strategies: &HashMap<String, ResolvedStrategy>,
        out: &mut Vec<&'a ClassDef>,
    ) {
        let schema: &'a SchemaDef = self.schema;
        let subclasses = schema
            .classes
            .iter()
            .filter(|c| c.base.as_deref() == Some(class));
        for sub in subclasses {
            let shares = strategies
                .get(&sub.name)
                .is_some_and(|s| s.table.as_deref() == Some(table));
            if shares {
                out.push(sub);
                self.sharing_descendants(&sub.name, table, strategies, out);
            }
        }
    }

    fn merge(&self, partials: Vec<PartialMapping>) -> Result<SchemaMapping> {
        let mut classes = Vec::new();
        let mut class_tables = Vec::new();
        let mut array_tables: Vec<MappedTable> = Vec::new();
        let mut link_tables = Vec::new();
        let mut relationships = Vec::new();
        let mut array_paths = Vec::new();
        let mut seen_paths = HashSet::new();
        let mut issues = Vec::new();

        for partial in partials {
            classes.extend(partial.classes);
            class_tables.extend(partial.class_tables);
            link_tables.extend(partial.link_tables);
            relationships.extend(partial.relationships);
            for table in partial.array_tables {
                match array_tables.iter().find(|t| t.name == table.name) {
                    Some(existing) if *existing == table => {}
                    Some(existing) => issues.push(Error::NamingCollision {
                        table: table.name.clone(),
                        name: table.name.clone(),
                        first: format!("elements of {}", existing.owner),
                        second: format!("elements of {}", table.owner),
                    }),
                    None => array_tables.push(table),
                }
            }
            for path in partial.array_paths {
                if seen_paths.insert((path.owner.clone(), path.path.clone())) {
                    array_paths.push(path);
                }
            }
        }

        classes.sort_by_key(|(i, _)| *i);
        class_tables.sort_by_key(|(i, _)| *i);
        link_tables.sort_by_key(|(i, _)| *i);
        relationships.sort_by_key(|(i, _)| *i);

        let tables: Vec<MappedTable> = class_tables
            .into_iter()
            .map(|(_, t)| t)
            .chain(array_tables)
            .chain(link_tables.into_iter().map(|(_, t)| t))
            .collect();

        let mut owners: HashMap<&str, &MappedTable> = HashMap::new();
        for table in &tables {
            if let Some(first) = owners.insert(&table.name, table) {
                issues.push(Error::NamingCollision {
                    table: table.name.clone(),
                    name: table.name.clone(),
                    first: format!("{} table of {}", first.kind, first.owner),
                    second: format!("{} table of {}", table.kind, table.owner),
                });
            }
        }
        Error::from_issues(issues)?;

        Ok(SchemaMapping {
            schema_name: self.schema.name.clone(),
            alias: self.schema.alias.clone(),
            version: self.schema.version,
            classes: classes.into_iter().map(|(_, c)| c).collect(),
            tables,
            relationships: relationships.into_iter().map(|(_, r)| r).collect(),
            array_paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{PrimitiveType, PropertyDef, RelationshipClassDef, StrategyHint};

    fn store_schema() -> SchemaDef {
        SchemaDef::new("Store", "sc", SchemaVersion::new(1, 0))
            .with_class(
                ClassDef::entity("Furniture")
                    .with_strategy(StrategyHint::SharedHierarchyTable)
                    .with_property(PropertyDef::primitive("Name", PrimitiveType::String)),
            )
            .with_class(
                ClassDef::entity("Chair")
                    .with_base("Furniture")
                    .with_property(PropertyDef::primitive("Type", PrimitiveType::String))
                    .with_property(PropertyDef::primitive("Legs", PrimitiveType::Int32)),
            )
            .with_class(
                ClassDef::entity("Desk")
                    .with_base("Furniture")
                    .with_property(PropertyDef::primitive("Type", PrimitiveType::String))
                    .with_property(PropertyDef::primitive_array("Drawers", PrimitiveType::Int32)),
            )
            .with_class(ClassDef::entity("Room"))
            .with_relationship(RelationshipClassDef::one_to_many("Contains", "Room", "Furniture"))
            .with_class(
                ClassDef::entity("Supplier")
                    .with_property(PropertyDef::primitive("Code", PrimitiveType::String))
                    .with_property(PropertyDef::primitive_array("Zones", PrimitiveType::Int32)),
            )
    }

    #[test]
    fn test_shared_table_layout() {
        let schema = store_schema();
        let mapping = SchemaMapper::new(&schema).map().unwrap();

        assert_eq!(
            mapping.table_names(),
            vec!["sc_Furniture", "sc_Room", "sc_Supplier", "sc_ArrayOfInt32"]
        );
        let furniture = mapping.get_table("sc_Furniture").unwrap();
        assert_eq!(
            furniture.column_names(),
            vec!["ECInstanceId", "ECClassId", "Name", "Type", "Legs", "RoomId"]
        );
        assert!(mapping.get_table("sc_Chair").is_none());
        assert_eq!(
            mapping.class("Desk").unwrap().table.as_deref(),
            Some("sc_Furniture")
        );
        assert_eq!(mapping.array_paths.len(), 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let schema = store_schema();
        let parallel = SchemaMapper::new(&schema).with_parallel(true).map().unwrap();
        let sequential = SchemaMapper::new(&schema).with_parallel(false).map().unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_validation_can_be_left_to_the_caller() {
        let schema = SchemaDef::new("S", "s", SchemaVersion::new(1, 0)).with_class(
            ClassDef::entity("A")
                .with_property(PropertyDef::primitive("x", PrimitiveType::Int32))
                .with_property(PropertyDef::primitive("x", PrimitiveType::Int32)),
        );

        let err = SchemaMapper::new(&schema).map().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);

        // Unvalidated, the duplicate only surfaces as a column clash.
        let err = SchemaMapper::new(&schema)
            .with_validation(false)
            .map()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NamingCollision);
    }

    #[test]
    fn test_collisions_are_all_reported() {
        let schema = SchemaDef::new("S", "s", SchemaVersion::new(1, 0))
            .with_class(
                ClassDef::structure("Pair")
                    .with_property(PropertyDef::primitive("b", PrimitiveType::Int32)),
            )
            .with_class(
                ClassDef::entity("A")
                    .with_property(PropertyDef::structure("a", "Pair"))
                    .with_property(PropertyDef::primitive("a_b", PrimitiveType::Int32)),
            )
            .with_class(
                ClassDef::entity("B")
                    .with_property(PropertyDef::primitive("ECInstanceId", PrimitiveType::Int64)),
            );
        let err = SchemaMapper::new(&schema).map().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NamingCollision);
        let subjects: Vec<_> = err.diagnostics().into_iter().map(|d| d.subject).collect();
        assert_eq!(subjects, vec!["s_A.a_b", "s_B.ECInstanceId"]);
    }

    #[test]
    fn test_rename_resolves_collision() {
        let schema = SchemaDef::new("S", "s", SchemaVersion::new(1, 0))
            .with_class(
                ClassDef::structure("Pair")
                    .with_property(PropertyDef::primitive("b", PrimitiveType::Int32)),
            )
            .with_class(
                ClassDef::entity("A")
                    .with_property(PropertyDef::structure("a", "Pair"))
                    .with_property(PropertyDef::primitive("a_b", PrimitiveType::Int32)),
            );
        let renames = ColumnRenames::new().with("A.a", "Pair");
        let mapping = SchemaMapper::new(&schema)
            .with_renames(&renames)
            .map()
            .unwrap();
        assert_eq!(
            mapping.get_table("s_A").unwrap().column_names(),
            vec!["ECInstanceId", "Pair_b", "a_b"]
        );
    }

    #[test]
    fn test_table_name_clash_between_class_and_link() {
        let schema = SchemaDef::new("S", "s", SchemaVersion::new(1, 0))
            .with_class(ClassDef::entity("A"))
            .with_class(ClassDef::entity("B"))
            .with_class(ClassDef::entity("Links"))
            .with_relationship(RelationshipClassDef::many_to_many("Links", "A", "B"));
        let err = SchemaMapper::new(&schema).map().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NamingCollision);
        assert_eq!(err.diagnostics()[0].subject, "s_Links.s_Links");
    }
}
