//! Core building blocks: the labeled data model (`dataset`, `tree`), the
//! shape-driven decoding engine (`decode`), and the two executors that drive
//! it (`layout` for path rules, `compound` for catalogued builders). These are
//! internal primitives consumed by the product readers and the `api` module.
pub mod compound;
pub mod dataset;
pub mod decode;
pub mod layout;
pub mod params;
pub mod tree;

pub use dataset::{Attrs, DataArray, Dataset, Variable};
pub use params::ReaderOptions;
pub use tree::Tree;
