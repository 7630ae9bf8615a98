//! High-level, ergonomic library API: open a product directory and get its
//! metadata as a [`Tree`]. Prefer these entry points over the low-level
//! decoding modules when integrating safetree.
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;
use tracing::{info, warn};

use crate::core::params::ReaderOptions;
use crate::core::tree::Tree;
use crate::error::{Error, Result};
use crate::io::{DirMapper, Mapper};
use crate::products::{rcm, sentinel1};

/// Where the lookup tables of an RCM product are grafted
pub const LOOKUP_TABLES: &str = "/lookupTables";

/// RCM product reader.
///
/// Each node is computed on first access and kept; the reader is not `Sync`,
/// so a node is never computed twice. With [`ReaderOptions::eager`] every node
/// is computed by [`ProductReader::new`].
pub struct ProductReader<M: Mapper> {
    mapper: M,
    options: ReaderOptions,
    product: OnceCell<Tree>,
    noise_levels: OnceCell<Tree>,
    incidence_angles: OnceCell<Tree>,
}

impl<M: Mapper> ProductReader<M> {
    pub fn new(mapper: M, options: ReaderOptions) -> Result<Self> {
        let reader = Self {
            mapper,
            options,
            product: OnceCell::new(),
            noise_levels: OnceCell::new(),
            incidence_angles: OnceCell::new(),
        };
        if reader.options.eager {
            info!("computing every node at open");
            reader.product()?;
            reader.noise_levels()?;
            reader.incidence_angles()?;
        }
        Ok(reader)
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// `product.xml`
    pub fn product(&self) -> Result<&Tree> {
        self.product
            .get_or_try_init(|| rcm::read_product(&self.mapper, &self.options))
    }

    /// Every `noiseLevels_<POLE>.xml`, merged along `pole`
    pub fn noise_levels(&self) -> Result<&Tree> {
        self.noise_levels.get_or_try_init(|| {
            let files = rcm::noise_level_files(&self.mapper)?;
            rcm::read_noise_levels(&self.mapper, rcm::CALIBRATION_ROOT, &files[..], &self.options)
        })
    }

    /// The incidence angle table named by the product
    pub fn incidence_angles(&self) -> Result<&Tree> {
        self.incidence_angles.get_or_try_init(|| {
            let product = self.product()?;
            rcm::read_incidence_angles(&self.mapper, product, &self.options)
        })
    }

    /// All nodes in one tree: the product at the root, lookup tables below
    /// [`LOOKUP_TABLES`]
    pub fn tree(&self) -> Result<Tree> {
        let lookup_tables = self
            .incidence_angles()?
            .clone()
            .graft("/noiseLevels", self.noise_levels()?.clone())?;
        self.product()?.clone().graft(LOOKUP_TABLES, lookup_tables)
    }
}

/// Open an RCM product directory
pub fn open_rcm<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<ProductReader<DirMapper>> {
    let mapper = DirMapper::new(path)?;
    info!("opening RCM product {}", mapper.root().display());
    ProductReader::new(mapper, options)
}

/// Derived metadata of every swath of a Sentinel-1 SAFE directory
pub fn open_sentinel1<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<Tree> {
    let mapper = DirMapper::new(path)?;
    info!("opening SAFE product {}", mapper.root().display());
    sentinel1::read_swaths(&mapper, options)
}

/// Supported product families
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductFamily {
    Rcm,
    Sentinel1,
}

/// Guess the family from the directory contents
pub fn detect_family(path: &Path) -> Result<ProductFamily> {
    let mapper = DirMapper::new(path)?;
    if !mapper.glob(rcm::PRODUCT_FILE)?.is_empty() {
        return Ok(ProductFamily::Rcm);
    }
    if !sentinel1::annotation_files(&mapper)?.is_empty() {
        return Ok(ProductFamily::Sentinel1);
    }
    Err(Error::InvalidArgument {
        arg: "product directory",
        value: path.display().to_string(),
    })
}

/// Open any supported product and return its complete tree
pub fn open_product<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Tree> {
    match detect_family(path.as_ref())? {
        ProductFamily::Rcm => open_rcm(path, options)?.tree(),
        ProductFamily::Sentinel1 => open_sentinel1(path, &options),
    }
}

/// Outcome of [`read_directory`]
#[derive(Debug, Default)]
pub struct BatchReport {
    pub read: usize,
    pub skipped: usize,
    pub errors: usize,
    pub trees: Vec<(PathBuf, Tree)>,
}

/// Product subdirectories of `input_dir`, sorted
pub fn iterate_products(input_dir: &Path) -> Result<std::vec::IntoIter<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs.into_iter())
}

/// Open every product below `input_dir`. Unrecognised directories are
/// skipped; with `continue_on_error` a failing product is counted and the
/// batch goes on, otherwise its error is returned.
pub fn read_directory(input_dir: &Path, options: &ReaderOptions, continue_on_error: bool) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    for path in iterate_products(input_dir)? {
        if detect_family(&path).is_err() {
            warn!("skipping {}: not a recognised product", path.display());
            report.skipped += 1;
            continue;
        }
        match open_product(&path, options.clone()) {
            Ok(tree) => {
                report.read += 1;
                report.trees.push((path, tree));
            }
            Err(e) => {
                warn!("failed to read {}: {}", path.display(), e);
                report.errors += 1;
                if !continue_on_error {
                    return Err(e);
                }
            }
        }
    }
    Ok(report)
}
