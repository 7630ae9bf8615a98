//! Per-class extractors and the generic `extract` dispatcher.
use num_complex::Complex64;
use tracing::debug;

use super::classify::{CompositeKind, Structure, classify, composite_kind, composite_kind_of};
use super::columns::{RowTable, columnarize, scalar_column, squeeze};
use super::stack::{STACKED_DIM, unstack_data_array, unstack_dataset};
use crate::core::dataset::{Attrs, DataArray, Dataset, Variable};
use crate::core::tree::Tree;
use crate::error::{Error, Result};
use crate::types::{ArrayData, DecodedNode, Markers, Scalar};

/// Result of extracting one decoded node
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    Variable(Variable),
    DataArray(DataArray),
    Dataset(Dataset),
    Tree(Tree),
}

impl Extracted {
    pub fn kind(&self) -> &'static str {
        match self {
            Extracted::Variable(_) => "variable",
            Extracted::DataArray(_) => "data array",
            Extracted::Dataset(_) => "dataset",
            Extracted::Tree(_) => "tree",
        }
    }
}

/// Classify `node` and run the matching extractor.
///
/// `dims` names the dimensions of array-valued results; nested row
/// datasets infer them from their index columns when it is `None`.
pub fn extract(node: &DecodedNode, dims: Option<&[String]>, markers: &Markers) -> Result<Extracted> {
    let extracted = match classify(node, markers)? {
        Structure::Scalar(s) => Extracted::Variable(Variable::scalar(s.clone())),
        Structure::AttributedVariable(_) => {
            Extracted::Variable(extract_variable(node, dims, markers)?)
        }
        Structure::CompositeValue(items) => {
            Extracted::Variable(extract_composite(items, dims, markers)?)
        }
        Structure::HomogeneousArray(items) => {
            Extracted::Variable(extract_array(items, required(dims)?, markers)?)
        }
        Structure::NestedRowArray(rows) => Extracted::DataArray(extract_nested_array(rows, markers)?),
        Structure::NestedRowDataset(rows) => {
            Extracted::Dataset(extract_nested_dataset(rows, dims, markers)?)
        }
        Structure::NestedSubtree(rows) => Extracted::Tree(extract_nested_tree(rows, dims, markers)?),
    };
    Ok(extracted)
}

fn required(dims: Option<&[String]>) -> Result<&[String]> {
    dims.ok_or_else(|| Error::schema("<node>", "array value needs dimension names"))
}

/// Homogeneous array of scalars, one-element scalar lists, scalar rows or
/// complex values
pub fn extract_array(items: &[DecodedNode], dims: &[String], markers: &Markers) -> Result<Variable> {
    // a pulse list arrives as one whitespace-separated string
    if *dims == ["pulses"] && items.len() == 1 {
        if let Some(text) = items[0].as_scalar().and_then(Scalar::as_str) {
            let values: Vec<Scalar> = text.split_whitespace().map(Scalar::parse_text).collect();
            return Variable::new(dims.iter().cloned(), ArrayData::from_scalars(&values));
        }
    }
    let mut variable = Variable::new(dims.iter().cloned(), array_values(items, dims, markers)?)?;
    if matches!(variable.data, ArrayData::Complex(_)) {
        variable.attrs.insert("type".into(), "complex".into());
    }
    Ok(variable)
}

fn array_values(items: &[DecodedNode], dims: &[String], markers: &Markers) -> Result<ArrayData> {
    if items.iter().all(DecodedNode::is_scalar) {
        let values: Vec<Scalar> = items.iter().filter_map(|i| i.as_scalar().cloned()).collect();
        return Ok(ArrayData::from_scalars(&values));
    }
    if items.iter().all(|i| composite_kind(i, markers) == Some(CompositeKind::Complex)) {
        let values = items
            .iter()
            .map(|item| complex_scalar(item, markers))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ArrayData::from_complex(values));
    }
    let rows = items
        .iter()
        .map(|item| match item {
            DecodedNode::List(row) if row.iter().all(DecodedNode::is_scalar) => {
                Ok(row.iter().filter_map(|v| v.as_scalar().cloned()).collect::<Vec<_>>())
            }
            _ => Err(Error::schema("<node>", "array mixes scalars and structures")),
        })
        .collect::<Result<Vec<_>>>()?;
    if dims.len() == 1 && rows.iter().all(|r| r.len() == 1) {
        let flat: Vec<Scalar> = rows.into_iter().flatten().collect();
        return Ok(ArrayData::from_scalars(&flat));
    }
    ArrayData::from_rows(&rows)
}

/// Part name to text content of a composite value
fn composite_parts<'a>(items: &'a [DecodedNode], markers: &Markers) -> Vec<(String, &'a DecodedNode)> {
    let key = markers.discriminator_key();
    items
        .iter()
        .filter_map(|item| {
            let name = item.get(&key)?.as_scalar()?.as_str()?.to_lowercase();
            Some((name, item.get(&markers.text)?))
        })
        .collect()
}

/// Numeric values of one composite part and whether the part is a scalar
fn part_values(part: &DecodedNode, name: &str) -> Result<(Vec<f64>, bool)> {
    let as_number = |s: &Scalar| {
        s.as_f64()
            .ok_or_else(|| Error::schema("<node>", format!("{} part is not numeric: {}", name, s)))
    };
    match part {
        DecodedNode::Scalar(s) => Ok((vec![as_number(s)?], true)),
        DecodedNode::List(items) => {
            let values = items
                .iter()
                .map(|i| {
                    i.as_scalar()
                        .ok_or_else(|| Error::schema("<node>", format!("{} part holds structures", name)))
                        .and_then(|s| as_number(s))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((values, false))
        }
        DecodedNode::Map(_) => Err(Error::schema("<node>", format!("{} part is a mapping", name))),
    }
}

fn complex_scalar(item: &DecodedNode, markers: &Markers) -> Result<Complex64> {
    let items = item.as_list().unwrap_or_default();
    let mut re = f64::NAN;
    let mut im = f64::NAN;
    for (name, part) in composite_parts(items, markers) {
        let value = match part_values(part, &name)? {
            (values, true) => values[0],
            _ => return Err(Error::schema("<node>", "complex array element is not a scalar")),
        };
        if name == "real" {
            re = value;
        } else {
            im = value;
        }
    }
    Ok(Complex64::new(re, im))
}

/// Complex (real, imaginary) or magnitude value, scalar or 1-D
pub fn extract_composite(items: &[DecodedNode], dims: Option<&[String]>, markers: &Markers) -> Result<Variable> {
    let kind = composite_kind_of(items, markers)
        .ok_or_else(|| Error::schema("<node>", "not a composite value"))?;
    let mut parts = composite_parts(items, markers)
        .into_iter()
        .map(|(name, part)| part_values(part, &name).map(|v| (name, v)))
        .collect::<Result<Vec<_>>>()?;
    parts.sort_by(|a, b| b.0.cmp(&a.0));

    let (data, is_scalar, label) = match kind {
        CompositeKind::Magnitude => {
            let (_, (values, is_scalar)) = parts.remove(0);
            (ArrayData::from_f64(values), is_scalar, "magnitude")
        }
        CompositeKind::Complex => {
            // sorted descending: real before imaginary
            let (_, (re, re_scalar)) = parts.remove(0);
            let (_, (im, im_scalar)) = parts.remove(0);
            if re.len() != im.len() || re_scalar != im_scalar {
                return Err(Error::shape(
                    dims.and_then(|d| d.first()).map_or("<composite>", String::as_str),
                    format!("{} real parts but {} imaginary parts", re.len(), im.len()),
                ));
            }
            let values = re.into_iter().zip(im).map(|(r, i)| Complex64::new(r, i)).collect();
            (ArrayData::from_complex(values), re_scalar, "complex")
        }
    };
    let variable = if is_scalar {
        Variable::new(Vec::<String>::new(), data.into_shape(&[])?)?
    } else {
        Variable::new(required(dims)?.iter().cloned(), data)?
    };
    Ok(variable.with_attr("type", label))
}

/// Mapping of attributes and text content; attributes lose their marker
pub fn extract_variable(node: &DecodedNode, dims: Option<&[String]>, markers: &Markers) -> Result<Variable> {
    let map = node
        .as_map()
        .ok_or_else(|| Error::schema("<node>", "variable must be a mapping"))?;
    let mut attrs = Attrs::new();
    let mut content = None;
    for (key, value) in map {
        if markers.is_text(key) {
            content = Some(value);
        } else if markers.is_attribute(key) {
            let value = value
                .as_scalar()
                .ok_or_else(|| Error::schema(key.as_str(), "attribute is not a scalar"))?;
            attrs.insert(markers.strip(key).to_string(), value.clone());
        } else {
            return Err(Error::schema(key.as_str(), "unexpected child in a variable"));
        }
    }
    let content = content.ok_or_else(|| Error::schema("<node>", "variable has no text content"))?;
    let variable = match content {
        DecodedNode::Scalar(s) => Variable::scalar(s.clone()),
        DecodedNode::List(items) => extract_array(items, required(dims)?, markers)?,
        DecodedNode::Map(_) => return Err(Error::schema("<node>", "text content is a mapping")),
    };
    Ok(variable.with_attrs(attrs))
}

/// Rows of `(attributes, text)`; varying attributes become coordinates and
/// several of them are unstacked into a grid
pub fn extract_nested_array(rows: &[DecodedNode], markers: &Markers) -> Result<DataArray> {
    let table = RowTable::from_rows(rows, markers)?;
    let dims = table.inferred_dims();
    let text = table
        .data
        .get(&markers.text)
        .ok_or_else(|| Error::schema("<node>", "rows carry no text content"))?;
    let ignored: Vec<&String> = table.data.keys().filter(|k| !markers.is_text(k)).collect();
    if !ignored.is_empty() {
        debug!("nested array ignores child columns {:?}", ignored);
    }
    let values = scalar_column(&markers.text, text)?;
    let variable = Variable::new(dims.iter().cloned(), ArrayData::from_scalars(&values))?
        .with_attrs(table.attrs.clone());
    let array = DataArray {
        name: None,
        variable,
        coords: table.coords(&dims)?,
    };
    if dims == [STACKED_DIM] {
        unstack_data_array(array, STACKED_DIM)
    } else {
        Ok(array)
    }
}

/// Rows of records: each non-attribute column becomes a variable along the
/// row dimension
pub fn extract_nested_dataset(
    rows: &[DecodedNode],
    dims: Option<&[String]>,
    markers: &Markers,
) -> Result<Dataset> {
    extract_row_dataset(rows, dims, markers)
}

fn extract_row_dataset<'a, I>(rows: I, dims: Option<&[String]>, markers: &Markers) -> Result<Dataset>
where
    I: IntoIterator<Item = &'a DecodedNode>,
{
    let table = RowTable::from_rows(rows, markers)?;
    let dims = dims.map_or_else(|| table.inferred_dims(), <[String]>::to_vec);
    let mut ds = Dataset::with_attrs(table.attrs.clone());
    ds.coords = table.coords(&dims)?;
    for (name, column) in &table.data {
        let var = extract_nested_variable(column, &dims, markers).map_err(|e| e.at(name))?;
        ds.data_vars.insert(name.clone(), var);
    }
    ds.validate()?;
    if dims == [STACKED_DIM] {
        unstack_dataset(ds, STACKED_DIM)
    } else {
        Ok(ds)
    }
}

/// One column of a nested dataset: plain scalars, or scalar variables whose
/// attributes are taken from the first row
fn extract_nested_variable(column: &[&DecodedNode], dims: &[String], markers: &Markers) -> Result<Variable> {
    let Some(first) = column.first().map(|v| squeeze(v)) else {
        return Err(Error::schema("<node>", "empty column"));
    };
    match first {
        DecodedNode::Scalar(_) => {
            let values = scalar_column("<node>", column)?;
            Variable::new(dims.iter().cloned(), ArrayData::from_scalars(&values))
        }
        DecodedNode::Map(first_row) => {
            let attrs: Attrs = first_row
                .iter()
                .filter(|(k, _)| markers.is_attribute(k))
                .filter_map(|(k, v)| Some((markers.strip(k).to_string(), v.as_scalar()?.clone())))
                .collect();
            let cells: Vec<&DecodedNode> = column
                .iter()
                .map(|v| {
                    squeeze(v)
                        .get(&markers.text)
                        .ok_or_else(|| Error::schema("<node>", "scalar variable without text content"))
                })
                .collect::<Result<_>>()?;
            let values = scalar_column(&markers.text, &cells)?;
            Ok(Variable::new(dims.iter().cloned(), ArrayData::from_scalars(&values))?.with_attrs(attrs))
        }
        DecodedNode::List(_) => Err(Error::schema("<node>", "column holds nested lists")),
    }
}

/// Rows of sub-records: each child key becomes a tree node holding the
/// nested dataset of that child across rows
pub fn extract_nested_tree(rows: &[DecodedNode], dims: Option<&[String]>, markers: &Markers) -> Result<Tree> {
    let columns = columnarize(rows)?;
    let mut tree = Tree::new();
    for (name, column) in columns {
        if column.iter().any(|v| v.as_map().is_none()) {
            return Err(Error::schema(name.as_str(), "subtree column is not a list of records"));
        }
        let ds = extract_row_dataset(column, dims, markers).map_err(|e| e.at(&name))?;
        tree = tree.insert(&name, ds)?;
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node(value: serde_json::Value) -> DecodedNode {
        DecodedNode::from(value)
    }

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn variable(value: serde_json::Value, names: &[&str]) -> Variable {
        let d = dims(names);
        match extract(&node(value), Some(&d), &Markers::default()).unwrap() {
            Extracted::Variable(v) => v,
            other => panic!("expected a variable, got {}", other.kind()),
        }
    }

    #[test]
    fn unknown_discriminators_are_not_composites() {
        let items = [
            node(json!({"@dataStream": "Phase", "$": 1.0})),
            node(json!({"@dataStream": "Real", "$": 2.0})),
        ];
        let err = extract_composite(&items, None, &Markers::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
        // through the dispatcher such rows are an attributed row array
        let rows = node(json!([{"@dataStream": "phase", "$": 1.0}]));
        match extract(&rows, None, &Markers::default()).unwrap() {
            Extracted::DataArray(array) => {
                assert_eq!(array.variable.attrs["dataStream"], Scalar::from("phase"))
            }
            other => panic!("expected a data array, got {}", other.kind()),
        }
    }

    #[test]
    fn complex_composite() {
        let v = variable(
            json!([
                {"@dataStream": "Real", "$": [1.0, 2.0]},
                {"@dataStream": "Imaginary", "$": [3.0, 4.0]}
            ]),
            &["coefficients"],
        );
        assert_eq!(v.dims, vec!["coefficients"]);
        assert_eq!(
            v.data,
            ArrayData::from_complex(vec![Complex64::new(1.0, 3.0), Complex64::new(2.0, 4.0)])
        );
        assert_eq!(v.attrs["type"], Scalar::from("complex"));
    }

    #[test]
    fn scalar_complex_composite_is_rank_zero() {
        let v = variable(
            json!([{"@dataStream": "imaginary", "$": -1}, {"@dataStream": "real", "$": 0.5}]),
            &["x"],
        );
        assert!(v.dims.is_empty());
        assert_eq!(v.data.len(), 1);
    }

    #[test]
    fn magnitude_composite() {
        let v = variable(json!([{"@dataStream": "Magnitude", "$": [5, 6]}]), &["n"]);
        assert_eq!(v.data.to_f64_vec(), Some(vec![5.0, 6.0]));
        assert_eq!(v.attrs["type"], Scalar::from("magnitude"));
    }

    #[test]
    fn mismatched_complex_parts_fail() {
        let n = node(json!([
            {"@dataStream": "real", "$": [1.0, 2.0]},
            {"@dataStream": "imaginary", "$": [3.0]}
        ]));
        let err = extract(&n, Some(&dims(&["c"])), &Markers::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn arrays_use_given_dims() {
        let v = variable(json!([1, 2, 3]), &["x"]);
        assert_eq!(v.data, ArrayData::from_i64(vec![1, 2, 3]));
        let squeezed = variable(json!([[1.5], [2.5]]), &["x"]);
        assert_eq!(squeezed.shape(), &[2]);
        let pulses = variable(json!(["1 2 3"]), &["pulses"]);
        assert_eq!(pulses.data.to_i64_vec(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn attributed_variable_strips_markers() {
        let v = variable(json!({"@units": "m", "$": 12.5}), &["ignored"]);
        assert!(v.dims.is_empty());
        assert_eq!(v.attrs.keys().collect::<Vec<_>>(), vec!["units"]);
        let arr = variable(json!({"@units": "s", "$": [1, 2]}), &["time"]);
        assert_eq!(arr.dims, vec!["time"]);
        assert_eq!(arr.attrs["units"], Scalar::from("s"));
    }

    #[test]
    fn nested_row_array_recovers_its_coordinate() {
        let rows = node(json!([
            {"@pole": "HH", "$": 1.0},
            {"@pole": "HV", "$": 2.0},
            {"@pole": "VV", "$": 3.0}
        ]));
        let Extracted::DataArray(da) = extract(&rows, None, &Markers::default()).unwrap() else {
            panic!("expected a data array");
        };
        assert_eq!(da.variable.dims, vec!["pole"]);
        assert_eq!(
            da.coords["pole"].data,
            ArrayData::from_strings(vec!["HH", "HV", "VV"])
        );
        assert_eq!(da.variable.data.to_f64_vec(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn nested_row_array_with_two_indexes_unstacks() {
        let rows = node(json!([
            {"@line": 0, "@pixel": 0, "$": 1.0},
            {"@line": 0, "@pixel": 5, "$": 2.0},
            {"@line": 7, "@pixel": 0, "$": 3.0}
        ]));
        let da = extract_nested_array(rows.as_list().unwrap(), &Markers::default()).unwrap();
        assert_eq!(da.variable.dims, vec!["line", "pixel"]);
        assert_eq!(da.variable.data.count_missing(), 1);
    }

    #[test]
    fn nested_dataset_columns() {
        let rows = node(json!([
            {"@beam": "S1", "gain": {"@units": "dB", "$": 1.0}, "count": 3},
            {"@beam": "S2", "gain": {"@units": "dB", "$": 2.0}, "count": 4}
        ]));
        let ds = extract_nested_dataset(rows.as_list().unwrap(), None, &Markers::default()).unwrap();
        assert_eq!(ds.coords["beam"].dims, vec!["beam"]);
        assert_eq!(ds.data_vars["gain"].attrs["units"], Scalar::from("dB"));
        assert_eq!(ds.data_vars["count"].data.to_i64_vec(), Some(vec![3, 4]));
    }

    #[test]
    fn nested_dataset_honours_explicit_dims() {
        let rows = node(json!([{"a": 1, "b": 2.0}, {"a": 3, "b": 4.0}]));
        let ds = extract_nested_dataset(
            rows.as_list().unwrap(),
            Some(&dims(&["tie_points"])),
            &Markers::default(),
        )
        .unwrap();
        assert_eq!(ds.sizes()["tie_points"], 2);
    }

    #[test]
    fn nested_subtree_builds_one_node_per_child() {
        let rows = node(json!([
            {"imageCoordinate": {"line": 0, "pixel": 0}, "geodeticCoordinate": {"latitude": 1.0}},
            {"imageCoordinate": {"line": 0, "pixel": 9}, "geodeticCoordinate": {"latitude": 2.0}}
        ]));
        let d = dims(&["tie_points"]);
        let Extracted::Tree(tree) = extract(&rows, Some(&d), &Markers::default()).unwrap() else {
            panic!("expected a tree");
        };
        assert_eq!(
            tree.paths().collect::<Vec<_>>(),
            vec!["/imageCoordinate", "/geodeticCoordinate"]
        );
        let coords = tree.get("/imageCoordinate").unwrap();
        assert_eq!(coords.data_vars["pixel"].data.to_i64_vec(), Some(vec![0, 9]));
    }

    #[test]
    fn arrays_without_dims_are_rejected() {
        let err = extract(&node(json!([1, 2])), None, &Markers::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }
}
