#![doc = r##"
safetree: shape-driven decoding of SAR product metadata.

This crate turns the XML metadata of synthetic aperture radar products
(RADARSAT Constellation Mission, Sentinel-1 SAFE) into a tree of labeled,
multi-dimensional datasets. The decoding engine never knows the schema: it
looks at the shape of each decoded node (scalar, attributed value, array,
table of rows) and builds variables, coordinates and attributes from it.
Product knowledge is limited to small declarative layouts and builders.

Stability
---------
The public library API is experimental in initial releases and may evolve
as the crate stabilizes. Breaking changes can occur.

Add dependency
--------------
```toml
[dependencies]
safetree = "0.1"
```

Quick start: open an RCM product
--------------------------------
```rust,no_run
use safetree::{ReaderOptions, open_rcm};

fn main() -> safetree::Result<()> {
    let reader = open_rcm("/data/RCM1_example", ReaderOptions::default())?;
    let tree = reader.tree()?;
    for (path, ds) in tree.iter() {
        println!("{path}: {} variables", ds.data_vars.len());
    }
    Ok(())
}
```

Decode a document without a layout
----------------------------------
```rust
use safetree::core::decode::extract_dataset;
use safetree::io::decode_xml;
use safetree::types::Markers;

fn main() -> safetree::Result<()> {
    let xml = br#"<incidenceAngles>
        <stepSize>5</stepSize>
        <angles units="deg">20.1 20.5 21.0</angles>
    </incidenceAngles>"#;
    let markers = Markers::default();
    let doc = decode_xml(xml, &markers)?;
    let ds = extract_dataset(&doc, None, &markers)?;
    assert_eq!(ds.data_vars["angles"].shape(), &[3]);
    assert_eq!(ds.attrs["stepSize"], safetree::types::Scalar::Int(5));
    Ok(())
}
```

Error handling
--------------
All public functions return `safetree::Result<T>`; match on `safetree::Error`
to tell structural failures apart.

```rust,no_run
use safetree::{Error, ReaderOptions, open_product};

fn main() {
    match open_product("/bad/product", ReaderOptions::default()) {
        Ok(tree) => println!("{} nodes", tree.len()),
        Err(Error::MissingPath { path }) => eprintln!("missing {path}"),
        Err(Error::SchemaMismatch { path, reason }) => eprintln!("bad node at {path}: {reason}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Feature flags
-------------
- `parallel` (default): layout rules are evaluated on a bounded rayon pool
  when `ReaderOptions::max_parallelism` allows it.

Useful modules
--------------
- [`api`]: high-level entry points and the memoizing `ProductReader`.
- [`core`]: datasets, trees, the decoding engine, layouts and compounds.
- [`products`]: RCM layouts and Sentinel-1 builders.
- [`io`]: XML decoding and file access.
- [`error`]: crate-level `Error` and `Result`.
"##]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod products;
pub mod types;

// Curated public API surface
// Types
pub use core::{DataArray, Dataset, ReaderOptions, Tree, Variable};
pub use error::{Error, Result};
pub use types::{ArrayData, DecodedNode, Markers, Scalar};

// Engine
pub use core::compound::{CompoundSpec, Primitive, execute, execute_catalog};
pub use core::decode::{extract, extract_dataset, extract_metadata, merge_siblings};
pub use core::layout::{LayoutRule, build_tree};

// High-level API re-exports
pub use api::{
    BatchReport, ProductFamily, ProductReader, detect_family, iterate_products, open_product, open_rcm,
    open_sentinel1, read_directory,
};
