//! Mapping-to-dataset assembly.
//!
//! Scalar entries of a mapping become dataset attributes and every other
//! entry becomes a variable. A mapping whose only structured entry is a
//! nested row dataset is flattened into that dataset.
use tracing::warn;

use super::classify::{Structure, classify, is_nested_dataset};
use super::extract::{
    Extracted, extract_array, extract_composite, extract_nested_array, extract_nested_dataset,
    extract_variable,
};
use crate::core::dataset::{Attrs, Dataset, Variable};
use crate::error::{Error, Result};
use crate::types::{DecodedNode, Markers};

pub fn extract_dataset(node: &DecodedNode, dims: Option<&[String]>, markers: &Markers) -> Result<Dataset> {
    let map = node
        .as_map()
        .ok_or_else(|| Error::schema("<node>", "dataset source must be a mapping"))?;
    let mut attrs = Attrs::new();
    let mut entries: Vec<(&String, &DecodedNode)> = Vec::new();
    for (key, value) in map {
        match value {
            DecodedNode::Scalar(s) => {
                attrs.insert(markers.strip(key).to_string(), s.clone());
            }
            other => entries.push((key, other)),
        }
    }

    if let [(name, value)] = entries.as_slice() {
        if is_nested_dataset(value, markers) {
            let rows = value.as_list().unwrap_or_default();
            let ds = extract_nested_dataset(rows, dims, markers).map_err(|e| e.at(name))?;
            return Ok(ds.assign_attrs(attrs));
        }
    }

    let mut ds = Dataset::with_attrs(attrs);
    for (name, value) in entries {
        if is_nested_dataset(value, markers) {
            warn!("dropping nested dataset `{}` next to other variables", name);
            continue;
        }
        match extract_entry(name, value, dims, markers).map_err(|e| e.at(name))? {
            Extracted::Variable(var) => {
                ds.data_vars.insert(name.clone(), var);
            }
            Extracted::DataArray(da) => {
                for (coord_name, coord) in da.coords {
                    insert_coord(&mut ds, coord_name, coord)?;
                }
                ds.data_vars.insert(name.clone(), da.variable);
            }
            other => {
                return Err(Error::schema(name.as_str(), format!("unexpected {} entry", other.kind())));
            }
        }
    }
    ds.validate()?;
    Ok(ds)
}

/// Extract one mapping entry as a variable; `dims` defaults to the entry name
pub fn extract_entry(
    name: &str,
    node: &DecodedNode,
    dims: Option<&[String]>,
    markers: &Markers,
) -> Result<Extracted> {
    let default_dims = [name.to_string()];
    let dims = dims.unwrap_or(&default_dims);
    let extracted = match classify(node, markers)? {
        Structure::HomogeneousArray(items) => Extracted::Variable(extract_array(items, dims, markers)?),
        Structure::CompositeValue(items) => {
            Extracted::Variable(extract_composite(items, Some(dims), markers)?)
        }
        Structure::AttributedVariable(_) => {
            Extracted::Variable(extract_variable(node, Some(dims), markers)?)
        }
        Structure::NestedRowArray(rows) => {
            Extracted::DataArray(extract_nested_array(rows, markers)?.rename(name))
        }
        other => {
            return Err(Error::schema(
                "<node>",
                format!("cannot use {} as a variable", other.class()),
            ));
        }
    };
    Ok(extracted)
}

fn insert_coord(ds: &mut Dataset, name: String, coord: Variable) -> Result<()> {
    match ds.coords.get(&name) {
        Some(existing) if existing.equals(&coord) => Ok(()),
        Some(_) => Err(Error::shape(name, "coordinate differs between entries")),
        None => {
            ds.coords.insert(name, coord);
            Ok(())
        }
    }
}
