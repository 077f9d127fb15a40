//! Schema evolution.
//!
//! A new import is compared with the catalogued mapping of the same schema and
//! turned into a [`MigrationPlan`]:
//!
//! | Catalogued | Incoming | Plan |
//! |------------|----------|------|
//! | none | any | **Create**: every table |
//! | `M.m` | `M.n`, `n > m` | **Additive**: new tables, new nullable columns |
//! | `M.m` | `M.n`, `n <= m` | rejected (version conflict) |
//! | `M.m` | `N.x`, `N != M` | **Replace** when allowed, otherwise rejected |
//!
//! Additive plans never drop or retype anything; each regression is reported
//! as its own incompatible-change diagnostic.
//!
//! # Example
//!
//! ```ignore
//! use classmap_core::mapping::SchemaMapper;
//! use classmap_core::migration::Evolver;
//!
//! let mapping = SchemaMapper::new(&schema).map()?;
//! let plan = Evolver::new().evolve(&mapping, catalog.get(&schema.name)?.as_ref())?;
//! for statement in plan.statements() {
//!     println!("{}", statement);
//! }
//! ```

pub mod diff;
pub mod evolve;
pub mod plan;

pub use diff::{ClassChange, PropertyChange, RelationshipChange, SchemaDiff};
pub use evolve::Evolver;
pub use plan::{MigrationPlan, MigrationStep, PlanKind};
