pub mod offsets;
pub mod annotation;
pub mod aggregation;
pub mod document;
pub mod library;
pub mod wasm;

pub use offsets::*;
pub use annotation::*;
pub use aggregation::*;
pub use document::*;
pub use library::*;
