//! RADARSAT Constellation Mission layouts.
//!
//! `product.xml` is decoded by [`product_layout`]; every
//! `noiseLevels_<POLE>.xml` by [`noise_level_layout`], and the per-file trees
//! are merged along `pole` by [`read_noise_levels`].
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::core::dataset::Dataset;
use crate::core::decode::{extract_dataset, extract_nested_tree, merge_siblings, pad_common};
use crate::core::layout::{LayoutRule, Node, build_tree, fan_out};
use crate::core::params::ReaderOptions;
use crate::core::tree::{Tree, join_path};
use crate::error::{Error, Result};
use crate::io::{Mapper, decode_xml};
use crate::types::{DecodedNode, Markers, Scalar};

pub const PRODUCT_FILE: &str = "metadata/product.xml";
pub const CALIBRATION_ROOT: &str = "metadata/calibration";
pub const NOISE_LEVEL_GLOB: &str = "noiseLevels_*.xml";

const GEOGRAPHIC_INFORMATION: &str = "/imageReferenceAttributes/geographicInformation";

/// Attributes of a noise level entry that label it rather than describe it
const LEVEL_COORDS: [&str; 3] = ["sarCalibrationType", "pixelFirstNoiseValue", "stepSize"];

pub fn product_layout() -> Vec<LayoutRule> {
    let geo = |child: &str| format!("{}/{}", GEOGRAPHIC_INFORMATION, child);
    vec![
        LayoutRule::metadata("/", "/", &["securityAttributes"]),
        LayoutRule::metadata("/imageReferenceAttributes", "/imageReferenceAttributes", &[]),
        LayoutRule::dataset(&geo("ellipsoidParameters"), &geo("ellipsoidParameters"), &["params"]),
        LayoutRule::new(
            &geo("geolocationGrid"),
            &geo("geolocationGrid/imageTiePoint"),
            |node, ctx| geolocation_grid(node, ctx.markers).map(Node::from),
        ),
        LayoutRule::dataset(&geo("rationalFunctions"), &geo("rationalFunctions"), &["coefficients"]),
    ]
}

/// Tie points as a `(line, pixel)` grid
fn geolocation_grid(node: &DecodedNode, markers: &Markers) -> Result<Dataset> {
    let rows = entries(node);
    let dims = ["tie_points".to_string()];
    let tree = extract_nested_tree(&rows, Some(&dims[..]), markers)?;
    let merged = Dataset::merge(tree.into_nodes().into_values().collect())?;
    merged.set_index("tie_points", &["line", "pixel"])?.unstack("tie_points")
}

/// A repeated element is a list, a single one is not
fn entries(node: &DecodedNode) -> Vec<DecodedNode> {
    match node {
        DecodedNode::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// One noise level entry: its single non-trivial dimension is renamed to
/// `coefficients` and its labelling attributes become coordinates
fn read_level(node: &DecodedNode, extra_coords: &[&str], markers: &Markers) -> Result<Dataset> {
    let ds = extract_dataset(node, None, markers)?;
    let ds = match ds.sizes().into_iter().find(|(_, size)| *size > 1) {
        Some((dim, _)) => ds.swap_dims(&dim, "coefficients"),
        None => ds,
    };
    let names: Vec<&str> = LEVEL_COORDS.iter().chain(extra_coords).copied().collect();
    Ok(ds.reset_coords().move_attrs_to_coords(&names))
}

fn calibration_type(ds: &Dataset, index: usize) -> Result<Scalar> {
    ds.coords
        .get("sarCalibrationType")
        .and_then(|c| c.data.to_scalars().into_iter().next())
        .ok_or_else(|| Error::schema(format!("[{}]", index), "noise level without sarCalibrationType"))
}

fn levels_by_calibration_type(node: &DecodedNode, extra_coords: &[&str], markers: &Markers) -> Result<Dataset> {
    let levels = entries(node)
        .iter()
        .map(|entry| read_level(entry, extra_coords, markers))
        .collect::<Result<Vec<_>>>()?;
    let labels = levels
        .iter()
        .enumerate()
        .map(|(i, ds)| calibration_type(ds, i))
        .collect::<Result<Vec<_>>>()?;
    merge_siblings(levels, labels, "sarCalibrationType")
}

pub fn noise_level_layout() -> Vec<LayoutRule> {
    vec![
        LayoutRule::new("/referenceNoiseLevel", "/referenceNoiseLevel", |node, ctx| {
            levels_by_calibration_type(node, &[], ctx.markers).map(Node::from)
        }),
        LayoutRule::new("/perBeamReferenceNoiseLevel", "/perBeamReferenceNoiseLevel", |node, ctx| {
            levels_by_calibration_type(node, &["beam"], ctx.markers).map(Node::from)
        }),
        LayoutRule::new("/azimuthNoiseLevelScaling", "/azimuthNoiseLevelScaling", |node, ctx| {
            let levels = entries(node)
                .iter()
                .map(|entry| read_level(entry, &[], ctx.markers))
                .collect::<Result<Vec<_>>>()?;
            let labels: Vec<i64> = (0..levels.len() as i64).collect();
            merge_siblings(pad_common(levels), labels, "level").map(Node::from)
        }),
    ]
}

/// Pole code of a noise level file: `.../noiseLevels_VV.xml` is `VV`
pub fn pole_of(path: &str) -> Result<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".xml")
        .and_then(|stem| stem.rsplit_once('_'))
        .map(|(_, pole)| pole.to_string())
        .filter(|pole| !pole.is_empty())
        .ok_or_else(|| Error::InvalidArgument {
            arg: "noise level file",
            value: path.to_string(),
        })
}

pub fn read_product<M: Mapper + ?Sized>(mapper: &M, options: &ReaderOptions) -> Result<Tree> {
    info!("reading {}", PRODUCT_FILE);
    let doc = decode_xml(&mapper.read(PRODUCT_FILE)?, &options.markers())?;
    build_tree(&doc, &product_layout(), options)
}

/// Decode every noise level file under `root` and merge the results along
/// `pole`
pub fn read_noise_levels<M, S>(mapper: &M, root: &str, file_names: &[S], options: &ReaderOptions) -> Result<Tree>
where
    M: Mapper + ?Sized,
    S: AsRef<str>,
{
    if file_names.is_empty() {
        return Err(Error::missing(join_path(root, NOISE_LEVEL_GLOB)));
    }
    let rules = noise_level_layout();
    let keys: Vec<String> = file_names
        .iter()
        .map(|name| join_path(root, name.as_ref()).trim_start_matches('/').to_string())
        .collect();
    let per_file = fan_out(&keys, options.max_parallelism, |key| -> Result<(String, Tree)> {
        let pole = pole_of(key)?;
        info!("reading {}", key);
        let doc = decode_xml(&mapper.read(key)?, &options.markers())?;
        Ok((pole, build_tree(&doc, &rules, options)?))
    });
    let mut per_path: IndexMap<String, (Vec<String>, Vec<Dataset>)> = IndexMap::new();
    for result in per_file {
        let (pole, tree) = result?;
        for (node_path, ds) in tree {
            let (poles, datasets) = per_path.entry(node_path).or_default();
            poles.push(pole.clone());
            datasets.push(ds);
        }
    }
    let mut tree = Tree::new();
    for (path, (poles, datasets)) in per_path {
        debug!("merging {} along pole", path);
        let merged = merge_siblings(datasets, poles, "pole").map_err(|e| e.at(&path))?;
        tree = tree.insert(&path, merged)?;
    }
    Ok(tree)
}

/// Noise level files of the product, found by pattern
pub fn noise_level_files<M: Mapper + ?Sized>(mapper: &M) -> Result<Vec<String>> {
    let pattern = format!("{}/{}", CALIBRATION_ROOT, NOISE_LEVEL_GLOB);
    let keys = mapper.glob(&pattern)?;
    Ok(keys
        .into_iter()
        .filter_map(|k| k.rsplit('/').next().map(str::to_string))
        .collect())
}

/// The incidence angle lookup table named by `/imageReferenceAttributes`
pub fn read_incidence_angles<M: Mapper + ?Sized>(mapper: &M, product: &Tree, options: &ReaderOptions) -> Result<Tree> {
    let file = product
        .get("/imageReferenceAttributes")
        .and_then(|ds| ds.attrs.get("incidenceAngleFileName"))
        .and_then(Scalar::as_str)
        .ok_or_else(|| Error::missing("/imageReferenceAttributes/incidenceAngleFileName"))?;
    let key = format!("{}/{}", CALIBRATION_ROOT, file);
    info!("reading {}", key);
    let doc = decode_xml(&mapper.read(&key)?, &options.markers())?;
    let ds = extract_dataset(&doc, None, &options.markers())?.with_attr(crate::core::layout::PROVENANCE_ATTR, key);
    Tree::new().insert("/incidenceAngles", ds)
}
