use tracing::warn;

use crate::core::dataset::{Attrs, Dataset};
use crate::error::{Error, Result};
use crate::types::{DecodedNode, Markers};

/// Dataset holding only the attributes of a mapping.
///
/// Attribute-marked keys and scalar entries are kept (markers stripped)
/// unless listed in `ignored`. The scalar children of every entry named in
/// `collapse` are lifted into the same attributes.
pub fn extract_metadata(
    node: &DecodedNode,
    collapse: &[&str],
    ignored: &[String],
    markers: &Markers,
) -> Result<Dataset> {
    let map = node
        .as_map()
        .ok_or_else(|| Error::schema("<node>", "metadata source must be a mapping"))?;
    let mut attrs = Attrs::new();
    for (key, value) in map {
        if ignored.contains(key) {
            continue;
        }
        // attribute values are always scalars
        if let Some(s) = value.as_scalar() {
            attrs.insert(markers.strip(key).to_string(), s.clone());
        }
    }
    for name in collapse {
        let Some(section) = map.get(*name) else {
            continue;
        };
        let children = section
            .as_map()
            .ok_or_else(|| Error::schema(*name, "collapsed entry must be a mapping"))?;
        for (key, value) in children {
            match value.as_scalar() {
                Some(s) => {
                    attrs.insert(markers.strip(key).to_string(), s.clone());
                }
                None => warn!("`{}/{}` is not a scalar, left out of metadata", name, key),
            }
        }
    }
    Ok(Dataset::with_attrs(attrs))
}
