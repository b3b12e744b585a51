//! View inheritance and combination engine.
//!
//! Views are markup trees ("archs") that extend each other through edit
//! specs: an extension view's arch is a list of instructions locating nodes
//! in a base arch and replacing, wrapping, moving or editing them. This
//! crate materializes a requested view's full inheritance chain into one
//! merged tree, optionally stamps every node with the view it came from
//! (branding), and statically validates archs against a schema registry.
//!
//! Module map, leaf-first:
//! - [`arch`]: owned arena markup tree, parse/serialize/mutate.
//! - [`path`]: structural path queries (`//field[@name='x']`).
//! - [`expr`]: lexical analysis of embedded expressions.
//! - [`locator`]: edit-spec target resolution.
//! - [`applier`]: ordered edit-spec application.
//! - [`store`]: view records and the persistence seam.
//! - [`combine`]: cross-model chain resolution into a merged tree.
//! - [`branding`]: provenance distribution over a combined tree.
//! - [`schema`] / [`validate`]: schema registry seam and static validation.

pub mod applier;
pub mod arch;
pub mod branding;
pub mod combine;
pub mod error;
pub mod expr;
pub mod locator;
pub mod path;
pub mod schema;
pub mod store;
pub mod validate;

pub use applier::apply_inheritance_specs;
pub use arch::{tree_equal, Arch, NodeId, NodeKind};
pub use branding::distribute_branding;
pub use combine::{Combiner, ResolveCtx};
pub use error::{Result, ViewError};
pub use locator::locate_node;
pub use schema::{FieldInfo, SchemaRegistry, StaticSchema};
pub use store::{MemoryStore, NewView, View, ViewId, ViewMode, ViewPatch, ViewStore};
pub use validate::{ValidationReport, Validator, Warning};
