//! Relation metadata: catalog introspection, the per-Model cache and the
//! human-readable description.

mod cache;
mod describe;
mod inspector;
mod metadata;

pub use cache::MetadataCache;
pub use describe::describe;
pub use inspector::{RelationSummary, SchemaInspector};
pub use metadata::{
    ColumnInfo, ForeignKeyAction, ForeignKeyInfo, QualifiedName, RelationKind, RelationMetadata,
    UniqueConstraint,
};
