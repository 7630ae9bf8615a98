//! Shape-only classification of decoded nodes.
//!
//! The decoder gives no cardinality or type signal beyond the shape of what
//! it produced, so each node is tested against an ordered chain of
//! predicates; the first match wins.
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{DecodedNode, Markers, Scalar, StructuralClass};

/// A classified node, borrowing the part of the node its class needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Structure<'a> {
    Scalar(&'a Scalar),
    AttributedVariable(&'a IndexMap<String, DecodedNode>),
    CompositeValue(&'a [DecodedNode]),
    HomogeneousArray(&'a [DecodedNode]),
    NestedRowArray(&'a [DecodedNode]),
    NestedRowDataset(&'a [DecodedNode]),
    NestedSubtree(&'a [DecodedNode]),
}

impl Structure<'_> {
    pub fn class(&self) -> StructuralClass {
        match self {
            Structure::Scalar(_) => StructuralClass::Scalar,
            Structure::AttributedVariable(_) => StructuralClass::AttributedVariable,
            Structure::CompositeValue(_) => StructuralClass::CompositeValue,
            Structure::HomogeneousArray(_) => StructuralClass::HomogeneousArray,
            Structure::NestedRowArray(_) => StructuralClass::NestedRowArray,
            Structure::NestedRowDataset(_) => StructuralClass::NestedRowDataset,
            Structure::NestedSubtree(_) => StructuralClass::NestedSubtree,
        }
    }
}

/// Kind of a composite value, by its discriminator set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Complex,
    Magnitude,
}

pub fn classify<'a>(node: &'a DecodedNode, markers: &Markers) -> Result<Structure<'a>> {
    let structure = match node {
        DecodedNode::Scalar(s) => Structure::Scalar(s),
        DecodedNode::List(items) if items.is_empty() => {
            return Err(Error::schema(
                "<node>",
                "empty list has no element to classify",
            ));
        }
        DecodedNode::List(items) if composite_kind(node, markers).is_some() => {
            Structure::CompositeValue(items)
        }
        DecodedNode::List(items) if is_array(node, markers) => Structure::HomogeneousArray(items),
        DecodedNode::Map(map) if is_attributed_variable(node, markers) => {
            Structure::AttributedVariable(map)
        }
        DecodedNode::List(items) if is_nested(node, markers) => {
            if has_text(&items[0], markers) {
                Structure::NestedRowArray(items)
            } else {
                Structure::NestedRowDataset(items)
            }
        }
        DecodedNode::List(items) if items[0].as_map().is_some() => Structure::NestedSubtree(items),
        other => {
            return Err(Error::schema("<node>", format!("unrecognised structure: {}", describe(other))));
        }
    };
    debug!("classified {} as {}", describe(node), structure.class());
    Ok(structure)
}

/// Composite value: one or two `{discriminator, text}` parts whose
/// discriminators are exactly `{real, imaginary}` or `{magnitude}`
pub fn composite_kind(node: &DecodedNode, markers: &Markers) -> Option<CompositeKind> {
    composite_kind_of(node.as_list()?, markers)
}

pub fn composite_kind_of(items: &[DecodedNode], markers: &Markers) -> Option<CompositeKind> {
    if !(1..=2).contains(&items.len()) {
        return None;
    }
    let key = markers.discriminator_key();
    let mut streams: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let map = item.as_map()?;
        if map.len() != 2 || !map.contains_key(&key) || !map.contains_key(&markers.text) {
            return None;
        }
        streams.push(map[&key].as_scalar()?.as_str()?.to_lowercase());
    }
    streams.sort();
    match streams.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["imaginary", "real"] => Some(CompositeKind::Complex),
        ["magnitude"] => Some(CompositeKind::Magnitude),
        _ => None,
    }
}

pub fn is_complex(node: &DecodedNode, markers: &Markers) -> bool {
    composite_kind(node, markers) == Some(CompositeKind::Complex)
}

/// List of scalars, list of one-element scalar lists, or complex values
/// whose parts are themselves arrays
pub fn is_array(node: &DecodedNode, markers: &Markers) -> bool {
    let Some(first) = node.as_list().and_then(|items| items.first()) else {
        return false;
    };
    if is_complex(node, markers) {
        return first.get(&markers.text).is_some_and(|v| !v.is_scalar());
    }
    match first {
        DecodedNode::Scalar(_) => true,
        DecodedNode::List(inner) => {
            (inner.len() == 1 && inner[0].is_scalar()) || is_complex(first, markers)
        }
        DecodedNode::Map(_) => false,
    }
}

/// Mapping of scalar attributes and scalar text content only
pub fn is_scalar_variable(node: &DecodedNode, markers: &Markers) -> bool {
    node.as_map().is_some_and(|map| {
        map.iter()
            .all(|(k, v)| v.is_scalar() && (markers.is_text(k) || markers.is_attribute(k)))
    })
}

/// Mapping of scalar attributes whose text content is a scalar or an array
pub fn is_attributed_variable(node: &DecodedNode, markers: &Markers) -> bool {
    node.as_map().is_some_and(|map| {
        map.iter().all(|(k, v)| {
            if markers.is_text(k) {
                v.is_scalar() || is_array(v, markers)
            } else {
                markers.is_attribute(k) && v.is_scalar()
            }
        })
    })
}

/// List of row mappings whose values are all scalar, one-element arrays or
/// scalar variables (judged on the first row)
pub fn is_nested(node: &DecodedNode, markers: &Markers) -> bool {
    let Some(first) = node.as_list().and_then(|items| items.first()) else {
        return false;
    };
    let Some(row) = first.as_map() else {
        return false;
    };
    row.values().all(|v| {
        v.is_scalar()
            || (is_array(v, markers) && v.as_list().is_some_and(|l| l.len() == 1))
            || is_scalar_variable(v, markers)
    })
}

pub fn is_nested_array(node: &DecodedNode, markers: &Markers) -> bool {
    is_nested(node, markers) && node.as_list().is_some_and(|l| has_text(&l[0], markers))
}

pub fn is_nested_dataset(node: &DecodedNode, markers: &Markers) -> bool {
    is_nested(node, markers) && node.as_list().is_some_and(|l| !has_text(&l[0], markers))
}

fn has_text(row: &DecodedNode, markers: &Markers) -> bool {
    row.get(&markers.text).is_some()
}

/// Short shape description for diagnostics
pub fn describe(node: &DecodedNode) -> String {
    match node {
        DecodedNode::Scalar(s) => format!("scalar({})", s),
        DecodedNode::Map(m) => {
            let keys: Vec<&str> = m.keys().take(4).map(String::as_str).collect();
            format!("map{{{}{}}}", keys.join(","), if m.len() > 4 { ",…" } else { "" })
        }
        DecodedNode::List(l) => match l.first() {
            Some(first) => format!("list[{}; {}]", l.len(), describe(first)),
            None => "list[0]".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn class_of(value: serde_json::Value) -> Result<StructuralClass> {
        let node = DecodedNode::from(value);
        classify(&node, &Markers::default()).map(|s| s.class())
    }

    #[test]
    fn scalars_and_strings() {
        assert_eq!(class_of(json!(1.5)).unwrap(), StructuralClass::Scalar);
        assert_eq!(class_of(json!("1 2 3")).unwrap(), StructuralClass::Scalar);
    }

    #[test]
    fn composite_values_by_discriminator() {
        let complex = json!([
            {"@dataStream": "Real", "$": 1.0},
            {"@dataStream": "Imaginary", "$": 2.0}
        ]);
        assert_eq!(class_of(complex).unwrap(), StructuralClass::CompositeValue);
        let magnitude = json!([{"@dataStream": "magnitude", "$": [5, 6]}]);
        assert_eq!(class_of(magnitude).unwrap(), StructuralClass::CompositeValue);
    }

    #[test]
    fn unknown_discriminators_fall_through() {
        // same shape as a composite, but "phase" is not a known part
        let node = json!([{"@dataStream": "phase", "$": 1.0}]);
        assert_eq!(class_of(node).unwrap(), StructuralClass::NestedRowArray);
    }

    #[test]
    fn arrays() {
        assert_eq!(class_of(json!([1, 2, 3])).unwrap(), StructuralClass::HomogeneousArray);
        assert_eq!(class_of(json!([[1], [2]])).unwrap(), StructuralClass::HomogeneousArray);
        let complex_values = json!([
            [{"@dataStream": "real", "$": 1.0}, {"@dataStream": "imaginary", "$": 0.5}],
            [{"@dataStream": "real", "$": 2.0}, {"@dataStream": "imaginary", "$": 1.5}]
        ]);
        assert_eq!(class_of(complex_values).unwrap(), StructuralClass::HomogeneousArray);
    }

    #[test]
    fn attributed_variables() {
        assert_eq!(
            class_of(json!({"@units": "m", "$": 3.5})).unwrap(),
            StructuralClass::AttributedVariable
        );
        assert_eq!(
            class_of(json!({"@units": "dB", "$": [1, 2]})).unwrap(),
            StructuralClass::AttributedVariable
        );
        assert!(class_of(json!({"line": 1, "pixel": 2})).is_err());
    }

    #[test]
    fn row_lists_split_on_text_key() {
        assert_eq!(class_of(json!([{"a": 1}])).unwrap(), StructuralClass::NestedRowDataset);
        assert_eq!(class_of(json!([{"$": 1, "a": 2}])).unwrap(), StructuralClass::NestedRowArray);
        let rows = json!([{"@pole": "HH", "value": {"@units": "dB", "$": 1.0}, "count": [3]}]);
        assert_eq!(class_of(rows).unwrap(), StructuralClass::NestedRowDataset);
    }

    #[test]
    fn rows_of_structures_are_subtrees() {
        let rows = json!([
            {"imageCoordinate": {"line": 0, "pixel": 0}},
            {"imageCoordinate": {"line": 0, "pixel": 10}}
        ]);
        assert_eq!(class_of(rows).unwrap(), StructuralClass::NestedSubtree);
    }

    #[test]
    fn empty_lists_are_not_classified() {
        let err = class_of(json!([])).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
        assert!(class_of(json!([[1, 2], [3, 4]])).is_err());
    }
}
