//! envguard - schema-driven environment validation with secret masking
//!
//! A `.env.schema` file declares every variable an application needs: its
//! type, whether it is required, whether it is sensitive, and where its value
//! comes from. The engine resolves each value (literal, process environment,
//! interpolation, or resolver plugin), validates it, and then either prints a
//! report with every sensitive value masked or launches a command with the
//! resolved environment attached.
//!
//! Pipeline: [`schema`] -> [`resolve`] -> [`validate`] + [`classify`] ->
//! [`render`] (load) or [`inject`] (run).

pub mod classify;
pub mod constraint;
pub mod engine;
pub mod error;
pub mod expr;
pub mod inject;
pub mod plugins;
pub mod render;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod sensitive;
pub mod validate;

pub use constraint::TypeConstraint;
pub use engine::Engine;
pub use error::{FieldError, InjectError, ResolutionError, SchemaError, ValidationError};
pub use plugins::{ResolveContext, ResolverRegistry, ValueResolver};
pub use render::{OutputFormat, RenderOptions};
pub use report::{ResolvedField, ValidationReport};
pub use schema::{FieldDeclaration, SchemaDocument};
pub use sensitive::Guarded;
