//! Schema definition - a versioned set of classes and relationships.

use super::class::{ClassDef, ClassKind};
use super::property::PropertyKind;
use super::relationship::RelationshipClassDef;
use super::types::SchemaVersion;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A versioned object schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDef {
    /// Schema name; catalog key.
    pub name: String,
    /// Namespace prefix for every table this schema produces.
    pub alias: String,
    /// Schema version.
    pub version: SchemaVersion,
    /// Classes in declaration order.
    #[serde(default)]
    pub classes: Vec<ClassDef>,
    /// Relationship classes in declaration order.
    #[serde(default)]
    pub relationships: Vec<RelationshipClassDef>,
}

impl SchemaDef {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>, alias: impl Into<String>, version: SchemaVersion) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            version,
            classes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Parse a schema from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a schema from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Add a class.
    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }

    /// Add a relationship class.
    pub fn with_relationship(mut self, relationship: RelationshipClassDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Get a class by name.
    pub fn get_class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Declaration index of a class.
    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    /// Get a relationship class by name.
    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipClassDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Direct subclasses of a class, in declaration order.
    pub fn subclasses<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ClassDef> + 'a {
        self.classes
            .iter()
            .filter(move |c| c.base.as_deref() == Some(name))
    }

    /// Check if any entity derives from the class.
    pub fn has_entity_subclasses(&self, name: &str) -> bool {
        self.subclasses(name).any(ClassDef::is_entity)
    }

    /// The inheritance chain of a class, root first and ending with the class itself.
    pub fn base_chain(&self, name: &str) -> Result<Vec<&ClassDef>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name);

        while let Some(class_name) = current {
            if !seen.insert(class_name) {
                return Err(Error::invalid(name, "inheritance cycle"));
            }
            let class = self
                .get_class(class_name)
                .ok_or_else(|| Error::invalid(name, format!("unknown base class {class_name}")))?;
            chain.push(class);
            current = class.base.as_deref();
        }

        chain.reverse();
        Ok(chain)
    }

    /// Check the model for structural problems, reporting every one found.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.name.is_empty() {
            issues.push(Error::invalid("<schema>", "schema name is empty"));
        }
        if self.alias.is_empty() {
            issues.push(Error::invalid(&self.name, "schema alias is empty"));
        }

        let mut names = HashSet::new();
        for class in &self.classes {
            if !names.insert(class.name.as_str()) {
                issues.push(Error::invalid(&class.name, "duplicate class name"));
            }
        }
        let mut rel_names = HashSet::new();
        for rel in &self.relationships {
            if !rel_names.insert(rel.name.as_str()) {
                issues.push(Error::invalid(&rel.name, "duplicate relationship name"));
            }
        }

        for class in &self.classes {
            self.validate_class(class, &mut issues);
        }
        for class in self.classes.iter().filter(|c| c.is_struct()) {
            if self.struct_contains(&class.name, &class.name, &mut HashSet::new()) {
                issues.push(Error::invalid(&class.name, "struct contains itself"));
            }
        }
        for rel in &self.relationships {
            for (end_name, end) in [("source", &rel.source), ("target", &rel.target)] {
                match self.get_class(&end.class) {
                    None => issues.push(Error::invalid(
                        &rel.name,
                        format!("{end_name} class {} is not defined", end.class),
                    )),
                    Some(c) if !c.is_entity() => issues.push(Error::invalid(
                        &rel.name,
                        format!("{end_name} class {} is a {}, not an entity", c.name, c.kind),
                    )),
                    Some(_) => {}
                }
            }
        }

        Error::from_issues(issues)
    }

    fn validate_class(&self, class: &ClassDef, issues: &mut Vec<Error>) {
        let mut props = HashSet::new();
        for prop in &class.properties {
            if !props.insert(prop.name.as_str()) {
                issues.push(Error::invalid(
                    format!("{}.{}", class.name, prop.name),
                    "duplicate property name",
                ));
            }
            if let Some(target) = prop.struct_class() {
                match self.get_class(target) {
                    None => issues.push(Error::invalid(
                        format!("{}.{}", class.name, prop.name),
                        format!("struct class {target} is not defined"),
                    )),
                    Some(c) if !c.is_struct() => issues.push(Error::invalid(
                        format!("{}.{}", class.name, prop.name),
                        format!("{target} is a {}, not a struct", c.kind),
                    )),
                    Some(_) => {}
                }
            }
        }

        let Some(base_name) = class.base.as_deref() else {
            return;
        };
        let Some(base) = self.get_class(base_name) else {
            issues.push(Error::invalid(
                &class.name,
                format!("unknown base class {base_name}"),
            ));
            return;
        };
        if base.kind != class.kind {
            issues.push(Error::invalid(
                &class.name,
                format!("{} cannot derive from {} {}", class.kind, base.kind, base.name),
            ));
        }
        if self.in_inheritance_cycle(&class.name) {
            issues.push(Error::invalid(&class.name, "inheritance cycle"));
            return;
        }
        // A broken ancestor chain is reported on the ancestor itself.
        if let Ok(chain) = self.base_chain(base_name) {
            for prop in &class.properties {
                if let Some(owner) = chain.iter().find(|c| c.get_property(&prop.name).is_some()) {
                    issues.push(Error::invalid(
                        format!("{}.{}", class.name, prop.name),
                        format!("redefines property inherited from {}", owner.name),
                    ));
                }
            }
        }
    }

    fn in_inheritance_cycle(&self, name: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = self.get_class(name).and_then(|c| c.base.as_deref());
        while let Some(base) = current {
            if base == name {
                return true;
            }
            if !seen.insert(base) {
                return false;
            }
            current = self.get_class(base).and_then(|c| c.base.as_deref());
        }
        false
    }

    fn struct_contains<'a>(&'a self, root: &str, current: &'a str, visited: &mut HashSet<&'a str>) -> bool {
        if !visited.insert(current) {
            return false;
        }
        let Some(class) = self.get_class(current) else {
            return false;
        };
        class.properties.iter().any(|p| match &p.kind {
            PropertyKind::Struct { class } => {
                class == root || self.struct_contains(root, class, visited)
            }
            _ => false,
        })
    }

    /// Number of classes of a kind.
    pub fn count(&self, kind: ClassKind) -> usize {
        self.classes.iter().filter(|c| c.kind == kind).count()
    }
}
