//! Annotation list querying and export

pub mod filter;
pub mod export;

pub use filter::{sort_annotations, AnnotationQuery, Filter, FilterField, FilterOp, SortKey, SortSpec};
pub use export::{export_annotations, export_filename, ExportFormat};
