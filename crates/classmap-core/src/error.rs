//! Core error types.

use crate::schema::SchemaVersion;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Category of a failure, as reported in import results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The schema model is malformed.
    InvalidSchema,
    /// Two constructs synthesize the same table or column name.
    NamingCollision,
    /// A strategy hint contradicts the hierarchy or the catalog.
    MappingStrategyConflict,
    /// The incoming version is not acceptable for the catalogued one.
    VersionConflict,
    /// A non-additive change to an imported schema.
    IncompatibleChange,
    /// The store rejected a statement.
    DdlExecution,
    /// Storage plumbing failed.
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidSchema => "InvalidSchema",
            ErrorKind::NamingCollision => "NamingCollision",
            ErrorKind::MappingStrategyConflict => "MappingStrategyConflict",
            ErrorKind::VersionConflict => "VersionConflict",
            ErrorKind::IncompatibleChange => "IncompatibleChange",
            ErrorKind::DdlExecution => "DdlExecution",
            ErrorKind::Storage => "Storage",
        };
        f.write_str(name)
    }
}

/// A single reported problem, naming the offending construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Error category.
    pub kind: ErrorKind,
    /// Offending class, property path, table or statement.
    pub subject: String,
    /// Human readable description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}

/// Mapping, evolution and storage errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema model is malformed.
    #[error("invalid schema: {subject}: {message}")]
    InvalidSchema {
        /// Offending class, property or relationship.
        subject: String,
        /// What is wrong.
        message: String,
    },

    /// Two constructs produce the same name in one table (or the same table name).
    #[error("naming collision in {table}: `{name}` produced by {first} and {second}")]
    NamingCollision {
        /// Table in which the clash happens.
        table: String,
        /// The clashing column or table name.
        name: String,
        /// Origin of the name already present.
        first: String,
        /// Origin of the clashing name.
        second: String,
    },

    /// A strategy hint contradicts the hierarchy or the recorded mapping.
    #[error("mapping strategy conflict for class {class}: {message}")]
    MappingStrategyConflict {
        /// The class whose strategy cannot be honoured.
        class: String,
        /// What is contradictory.
        message: String,
    },

    /// Version rule violation.
    #[error("version conflict for schema {schema}: catalogued {catalogued}, incoming {incoming}")]
    VersionConflict {
        /// Schema name.
        schema: String,
        /// Version recorded in the catalog.
        catalogued: SchemaVersion,
        /// Version being imported.
        incoming: SchemaVersion,
    },

    /// A change that cannot be applied additively.
    #[error("incompatible change to {subject}: {message}")]
    IncompatibleChange {
        /// Offending table, column or property path.
        subject: String,
        /// What changed.
        message: String,
    },

    /// The store rejected a statement.
    #[error("DDL execution failed for `{statement}`: {reason}")]
    DdlExecution {
        /// The statement being executed.
        statement: String,
        /// Store-reported reason.
        reason: String,
    },

    /// Every issue found by one phase.
    #[error("{}", summarize(.0))]
    Multiple(Vec<Error>),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// SQLite error.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn summarize(errors: &[Error]) -> String {
    match errors {
        [] => "no errors".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

impl Error {
    /// Shorthand for [`Error::InvalidSchema`].
    pub fn invalid(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::IncompatibleChange`].
    pub fn incompatible(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Error::IncompatibleChange {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::MappingStrategyConflict`].
    pub fn strategy_conflict(class: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MappingStrategyConflict {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Turn a list of issues into a result: none is success, one is itself,
    /// more become [`Error::Multiple`].
    pub fn from_issues(mut issues: Vec<Error>) -> Result<()> {
        match issues.len() {
            0 => Ok(()),
            1 => Err(issues.remove(0)),
            _ => Err(Error::Multiple(issues)),
        }
    }

    /// Flatten into the individual issues this error carries.
    pub fn into_issues(self) -> Vec<Error> {
        match self {
            Error::Multiple(errors) => errors.into_iter().flat_map(Error::into_issues).collect(),
            other => vec![other],
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSchema { .. } => ErrorKind::InvalidSchema,
            Error::NamingCollision { .. } => ErrorKind::NamingCollision,
            Error::MappingStrategyConflict { .. } => ErrorKind::MappingStrategyConflict,
            Error::VersionConflict { .. } => ErrorKind::VersionConflict,
            Error::IncompatibleChange { .. } => ErrorKind::IncompatibleChange,
            Error::DdlExecution { .. } => ErrorKind::DdlExecution,
            Error::Multiple(errors) => errors
                .first()
                .map(Error::kind)
                .unwrap_or(ErrorKind::InvalidSchema),
            _ => ErrorKind::Storage,
        }
    }

    /// One diagnostic per offending construct.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let (subject, message) = match self {
            Error::Multiple(errors) => return errors.iter().flat_map(Error::diagnostics).collect(),
            Error::InvalidSchema { subject, message }
            | Error::IncompatibleChange { subject, message } => (subject.clone(), message.clone()),
            Error::MappingStrategyConflict { class, message } => (class.clone(), message.clone()),
            Error::NamingCollision {
                table,
                name,
                first,
                second,
            } => (
                format!("{table}.{name}"),
                format!("produced by {first} and {second}"),
            ),
            Error::VersionConflict {
                schema,
                catalogued,
                incoming,
            } => (
                schema.clone(),
                format!("catalogued version {catalogued}, incoming version {incoming}"),
            ),
            Error::DdlExecution { statement, reason } => (statement.clone(), reason.clone()),
            other => ("store".to_string(), other.to_string()),
        };
        vec![Diagnostic {
            kind: self.kind(),
            subject,
            message,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_issues() {
        assert!(Error::from_issues(Vec::new()).is_ok());

        let single = Error::from_issues(vec![Error::invalid("A", "bad")]).unwrap_err();
        assert!(matches!(single, Error::InvalidSchema { .. }));

        let many = Error::from_issues(vec![
            Error::incompatible("t.a", "dropped"),
            Error::incompatible("t.b", "dropped"),
        ])
        .unwrap_err();
        assert_eq!(many.kind(), ErrorKind::IncompatibleChange);
        assert_eq!(many.diagnostics().len(), 2);
        assert!(many.to_string().contains("and 1 more"));
    }

    #[test]
    fn test_diagnostic_subjects() {
        let err = Error::NamingCollision {
            table: "sc_Foo".into(),
            name: "a_b".into(),
            first: "Foo.a.b".into(),
            second: "Foo.a_b".into(),
        };
        let diags = err.diagnostics();
        assert_eq!(diags[0].subject, "sc_Foo.a_b");
        assert_eq!(diags[0].kind, ErrorKind::NamingCollision);
    }

    #[test]
    fn test_nested_multiple_flattens() {
        let err = Error::Multiple(vec![
            Error::Multiple(vec![Error::invalid("A", "x"), Error::invalid("B", "y")]),
            Error::invalid("C", "z"),
        ]);
        assert_eq!(err.into_issues().len(), 3);
    }

    #[test]
    fn test_plumbing_errors_are_storage() {
        let err = Error::Serialization("boom".into());
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.diagnostics()[0].subject, "store");
    }
}
