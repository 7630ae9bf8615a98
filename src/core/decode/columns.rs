//! Row/column helpers shared by the nested extractors.
use indexmap::IndexMap;

use super::stack::STACKED_DIM;
use crate::core::dataset::{Attrs, Variable};
use crate::error::{Error, Result};
use crate::types::{ArrayData, DecodedNode, Markers, Scalar};

/// Column name to the per-row values of that column
pub type Columns<'a> = IndexMap<String, Vec<&'a DecodedNode>>;

/// Transpose a list of row mappings into columns.
///
/// Every row must carry the same key set as the first row.
pub fn columnarize<'a, I>(rows: I) -> Result<Columns<'a>>
where
    I: IntoIterator<Item = &'a DecodedNode>,
{
    let mut columns: Columns<'a> = IndexMap::new();
    for (i, row) in rows.into_iter().enumerate() {
        let map = row
            .as_map()
            .ok_or_else(|| Error::schema("<node>", format!("row {} is not a mapping", i)))?;
        if i > 0 && (map.len() != columns.len() || map.keys().any(|k| !columns.contains_key(k))) {
            let expected: Vec<&str> = columns.keys().map(String::as_str).collect();
            let found: Vec<&str> = map.keys().map(String::as_str).collect();
            return Err(Error::schema(
                "<node>",
                format!("row {} has keys {:?}, expected {:?}", i, found, expected),
            ));
        }
        for (key, value) in map {
            columns.entry(key.clone()).or_default().push(value);
        }
    }
    Ok(columns)
}

/// Split entries into attribute-marked and the rest, keeping order
pub fn split_marked<V>(
    entries: IndexMap<String, V>,
    markers: &Markers,
) -> (IndexMap<String, V>, IndexMap<String, V>) {
    entries
        .into_iter()
        .partition(|(key, _)| markers.is_attribute(key))
}

/// Unwrap one-element lists
pub fn squeeze(node: &DecodedNode) -> &DecodedNode {
    match node {
        DecodedNode::List(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

pub fn scalar_column(name: &str, values: &[&DecodedNode]) -> Result<Vec<Scalar>> {
    values
        .iter()
        .map(|v| {
            squeeze(v).as_scalar().cloned().ok_or_else(|| {
                Error::schema(name, "expected one scalar per row")
            })
        })
        .collect()
}

/// A column holding one distinct value is an attribute rather than an index
pub fn is_uniform(values: &[Scalar]) -> bool {
    values
        .split_first()
        .is_some_and(|(first, rest)| rest.iter().all(|v| v.same_as(first)))
}

/// Row list split into constant attributes, varying index columns and data
/// columns
#[derive(Debug)]
pub struct RowTable<'a> {
    pub nrows: usize,
    pub attrs: Attrs,
    pub indexes: IndexMap<String, Vec<Scalar>>,
    pub data: Columns<'a>,
}

impl<'a> RowTable<'a> {
    pub fn from_rows<I>(rows: I, markers: &Markers) -> Result<Self>
    where
        I: IntoIterator<Item = &'a DecodedNode>,
    {
        let rows: Vec<&'a DecodedNode> = rows.into_iter().collect();
        let nrows = rows.len();
        let (marked, data) = split_marked(columnarize(rows)?, markers);
        let mut attrs = Attrs::new();
        let mut indexes = IndexMap::new();
        for (key, column) in marked {
            let name = markers.strip(&key).to_string();
            let values = scalar_column(&key, &column)?;
            if is_uniform(&values) {
                attrs.insert(name, values[0].clone());
            } else {
                indexes.insert(name, values);
            }
        }
        Ok(Self {
            nrows,
            attrs,
            indexes,
            data,
        })
    }

    /// A single varying column names the row dimension; none or several
    /// share an anonymous stacked dimension
    pub fn inferred_dims(&self) -> Vec<String> {
        match self.indexes.len() {
            1 => self.indexes.keys().cloned().collect(),
            _ => vec![STACKED_DIM.to_string()],
        }
    }

    /// Index columns as coordinates: on their own dimension when it is one of
    /// `dims`, on `dims` otherwise
    pub fn coords(&self, dims: &[String]) -> Result<IndexMap<String, Variable>> {
        self.indexes
            .iter()
            .map(|(name, values)| {
                let var_dims: Vec<String> = if dims.contains(name) {
                    vec![name.clone()]
                } else {
                    dims.to_vec()
                };
                Variable::new(var_dims, ArrayData::from_scalars(values)).map(|v| (name.clone(), v))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(value: serde_json::Value) -> Vec<DecodedNode> {
        match DecodedNode::from(value) {
            DecodedNode::List(items) => items,
            other => vec![other],
        }
    }

    #[test]
    fn columns_follow_first_row_order() {
        let rows = rows(json!([{"a": 1, "b": 2}, {"b": 4, "a": 3}]));
        let columns = columnarize(&rows).unwrap();
        assert_eq!(columns.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(columns["a"][1], &DecodedNode::Scalar(Scalar::Int(3)));
    }

    #[test]
    fn divergent_rows_are_rejected() {
        let rows = rows(json!([{"a": 1, "b": 2}, {"a": 3}]));
        let err = columnarize(&rows).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn uniform_columns_become_attributes() {
        let rows = rows(json!([
            {"@pole": "HH", "@beam": "S1", "$": 1},
            {"@pole": "HH", "@beam": "S2", "$": 2}
        ]));
        let table = RowTable::from_rows(&rows, &Markers::default()).unwrap();
        assert_eq!(table.attrs["pole"], Scalar::from("HH"));
        assert_eq!(table.indexes.keys().collect::<Vec<_>>(), vec!["beam"]);
        assert_eq!(table.inferred_dims(), vec!["beam"]);
        assert_eq!(table.data.keys().collect::<Vec<_>>(), vec!["$"]);
    }

    #[test]
    fn several_indexes_share_the_stacked_dim() {
        let rows = rows(json!([{"@x": 0, "@y": 0, "$": 1}, {"@x": 1, "@y": 0, "$": 2}]));
        let table = RowTable::from_rows(&rows, &Markers::default()).unwrap();
        // y is constant here, so only x varies
        assert_eq!(table.inferred_dims(), vec!["x"]);

        let rows = self::rows(json!([{"@x": 0, "@y": 0, "$": 1}, {"@x": 1, "@y": 1, "$": 2}]));
        let table = RowTable::from_rows(&rows, &Markers::default()).unwrap();
        let dims = table.inferred_dims();
        assert_eq!(dims, vec![STACKED_DIM]);
        let coords = table.coords(&dims).unwrap();
        assert_eq!(coords["x"].dims, vec![STACKED_DIM]);
    }

    #[test]
    fn single_row_columns_are_attributes() {
        assert!(is_uniform(&[Scalar::Int(1)]));
        assert!(!is_uniform(&[]));
        assert!(is_uniform(&[Scalar::Float(f64::NAN), Scalar::Float(f64::NAN)]));
    }
}
