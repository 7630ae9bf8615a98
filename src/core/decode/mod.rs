//! Structural decoding: classify a decoded node by shape, then turn it into
//! variables, datasets or trees.
//!
//! - `classify`: ordered shape predicates and the `Structure` they produce
//! - `columns`: row-to-column transposition and key/value splitting
//! - `extract`: per-class extractors and the `extract` dispatcher
//! - `assemble`: mapping-to-dataset assembly with single-child flattening
//! - `stack`: multi-index unstacking into a dense Cartesian grid
//! - `merge`: padding and merging of sibling datasets
//! - `metadata`: attribute-only extraction of a mapping
pub mod assemble;
pub mod classify;
pub mod columns;
pub mod extract;
pub mod merge;
pub mod metadata;
pub mod stack;

pub use assemble::extract_dataset;
pub use classify::{CompositeKind, Structure, classify};
pub use extract::{Extracted, extract, extract_nested_tree};
pub use merge::{merge_siblings, pad_common};
pub use metadata::extract_metadata;
pub use stack::{STACKED_DIM, unstack_data_array, unstack_dataset};
