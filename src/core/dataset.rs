//! Labeled n-dimensional values: `Variable`, `DataArray` (a variable with its
//! coordinates) and `Dataset`. Every transformation consumes or borrows its
//! input and returns a new value.
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ArrayData, Scalar};

pub type Attrs = IndexMap<String, Scalar>;

/// Dimension names, data and scalar attributes.
///
/// `dims.len()` always equals the rank of `data`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variable {
    pub dims: Vec<String>,
    pub data: ArrayData,
    pub attrs: Attrs,
}

impl Variable {
    pub fn new<I, S>(dims: I, data: ArrayData) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != data.ndim() {
            return Err(Error::shape(
                dims.join(","),
                format!(
                    "{} dimension name(s) for data of shape {:?}",
                    dims.len(),
                    data.shape()
                ),
            ));
        }
        Ok(Self {
            dims,
            data,
            attrs: Attrs::new(),
        })
    }

    /// Rank-0 variable
    pub fn scalar(value: impl Into<Scalar>) -> Self {
        Self {
            dims: Vec::new(),
            data: ArrayData::from_scalar(&value.into()),
            attrs: Attrs::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn sizes(&self) -> impl Iterator<Item = (&str, usize)> {
        self.dims
            .iter()
            .map(String::as_str)
            .zip(self.shape().iter().copied())
    }

    /// A coordinate indexes the dimension it is named after
    pub fn is_index_of(&self, name: &str) -> bool {
        self.dims.len() == 1 && self.dims[0] == name
    }

    pub fn rename_dim(mut self, old: &str, new: &str) -> Self {
        for d in self.dims.iter_mut().filter(|d| d.as_str() == old) {
            *d = new.to_string();
        }
        self
    }

    /// Leading dimension of length one
    pub fn expand_dims(self, dim: &str) -> Self {
        let mut dims = vec![dim.to_string()];
        dims.extend(self.dims);
        Self {
            dims,
            data: self.data.insert_axis(0),
            attrs: self.attrs,
        }
    }

    /// Grow every dimension listed in `sizes` to that size with missing cells
    pub fn pad_to(&self, sizes: &IndexMap<String, usize>) -> Self {
        let data = self
            .dims
            .iter()
            .enumerate()
            .fold(self.data.clone(), |data, (axis, dim)| match sizes.get(dim) {
                Some(&size) => data.pad_axis(axis, size),
                None => data,
            });
        Self {
            dims: self.dims.clone(),
            data,
            attrs: self.attrs.clone(),
        }
    }

    /// Same dimensions and values, attributes ignored
    pub fn equals(&self, other: &Self) -> bool {
        self.dims == other.dims && self.data.same_values(&other.data)
    }
}

/// A single named variable together with the coordinates it depends on
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataArray {
    pub name: Option<String>,
    pub variable: Variable,
    pub coords: IndexMap<String, Variable>,
}

impl DataArray {
    pub fn new(variable: Variable) -> Self {
        Self {
            name: None,
            variable,
            coords: IndexMap::new(),
        }
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn into_dataset(self, fallback_name: &str) -> Result<Dataset> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let mut ds = Dataset::new();
        ds.coords = self.coords;
        ds.data_vars.insert(name, self.variable);
        ds.validate()?;
        Ok(ds)
    }
}

/// Ordered data variables, coordinates and dataset-level attributes
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub data_vars: IndexMap<String, Variable>,
    pub coords: IndexMap<String, Variable>,
    pub attrs: Attrs,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attrs(attrs: Attrs) -> Self {
        Self {
            attrs,
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, var: Variable) -> Self {
        self.data_vars.insert(name.into(), var);
        self
    }

    pub fn with_coord(mut self, name: impl Into<String>, var: Variable) -> Self {
        self.coords.insert(name.into(), var);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Attributes from `attrs` override existing ones
    pub fn assign_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data_vars.is_empty() && self.coords.is_empty() && self.attrs.is_empty()
    }

    /// Data variable or coordinate
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name).or_else(|| self.coords.get(name))
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.coords.iter().chain(self.data_vars.iter())
    }

    /// Dimension sizes in first-seen order
    pub fn sizes(&self) -> IndexMap<String, usize> {
        let mut sizes = IndexMap::new();
        for (_, var) in self.variables() {
            for (dim, size) in var.sizes() {
                sizes.entry(dim.to_string()).or_insert(size);
            }
        }
        sizes
    }

    /// Check that each dimension has one size and that index coordinates are 1-D
    pub fn validate(&self) -> Result<()> {
        let mut sizes: IndexMap<&str, usize> = IndexMap::new();
        for (name, var) in self.variables() {
            for (dim, size) in var.sizes() {
                let known = *sizes.entry(dim).or_insert(size);
                if known != size {
                    return Err(Error::shape(
                        dim,
                        format!("variable `{}` has length {} but {} elsewhere", name, size, known),
                    ));
                }
            }
        }
        for (name, coord) in &self.coords {
            if coord.dims.iter().any(|d| d == name) && !coord.is_index_of(name) {
                return Err(Error::shape(
                    name.as_str(),
                    format!("coordinate `{}` indexes its own dimension but is {}-D", name, coord.dims.len()),
                ));
            }
        }
        Ok(())
    }

    pub fn rename_dim(self, old: &str, new: &str) -> Self {
        let rename = |vars: IndexMap<String, Variable>| -> IndexMap<String, Variable> {
            vars.into_iter()
                .map(|(k, v)| (k, v.rename_dim(old, new)))
                .collect()
        };
        Self {
            data_vars: rename(self.data_vars),
            coords: rename(self.coords),
            attrs: self.attrs,
        }
    }

    /// Replace dimension `old` by `new` on every variable
    pub fn swap_dims(self, old: &str, new: &str) -> Self {
        self.rename_dim(old, new)
    }

    /// Unstack the multi-index on `dim`; see [`crate::core::decode::stack`]
    pub fn unstack(self, dim: &str) -> Result<Self> {
        crate::core::decode::unstack_dataset(self, dim)
    }

    /// Non-index coordinates become data variables
    pub fn reset_coords(self) -> Self {
        let mut data_vars = self.data_vars;
        let mut coords = IndexMap::new();
        for (name, coord) in self.coords {
            if coord.is_index_of(&name) {
                coords.insert(name, coord);
            } else {
                data_vars.insert(name, coord);
            }
        }
        Self {
            data_vars,
            coords,
            attrs: self.attrs,
        }
    }

    /// Named data variables become coordinates
    pub fn set_coords(mut self, names: &[&str]) -> Result<Self> {
        for name in names {
            let var = self
                .data_vars
                .shift_remove(*name)
                .ok_or_else(|| Error::missing(*name))?;
            self.coords.insert(name.to_string(), var);
        }
        Ok(self)
    }

    /// Declare 1-D variables along `dim` as the levels of a multi-index on `dim`
    pub fn set_index(self, dim: &str, levels: &[&str]) -> Result<Self> {
        for level in levels {
            let var = self.get(level).ok_or_else(|| Error::missing(*level))?;
            if var.dims != [dim] {
                return Err(Error::shape(
                    dim,
                    format!("level `{}` has dims {:?}", level, var.dims),
                ));
            }
        }
        let movable: Vec<&str> = levels
            .iter()
            .copied()
            .filter(|l| self.data_vars.contains_key(*l))
            .collect();
        let mut ds = self.set_coords(&movable)?;
        // other coordinates along the dimension would become extra levels
        let extra: Vec<String> = ds
            .coords
            .iter()
            .filter(|(n, c)| c.dims == [dim] && !levels.contains(&n.as_str()))
            .map(|(n, _)| n.clone())
            .collect();
        for name in extra {
            if let Some(var) = ds.coords.shift_remove(&name) {
                ds.data_vars.insert(name, var);
            }
        }
        Ok(ds)
    }

    /// Scalar attributes named in `names` become rank-0 coordinates
    pub fn move_attrs_to_coords(mut self, names: &[&str]) -> Self {
        for name in names {
            if let Some(value) = self.attrs.shift_remove(*name) {
                self.coords.insert(name.to_string(), Variable::scalar(value));
            }
        }
        self
    }

    /// New leading dimension on every data variable; a rank-0 coordinate of
    /// the same name becomes its index
    pub fn expand_dims(self, dim: &str) -> Self {
        let data_vars = self
            .data_vars
            .into_iter()
            .map(|(k, v)| (k, v.expand_dims(dim)))
            .collect();
        let coords = self
            .coords
            .into_iter()
            .map(|(k, v)| {
                let v = if k == dim && v.dims.is_empty() { v.expand_dims(dim) } else { v };
                (k, v)
            })
            .collect();
        Self {
            data_vars,
            coords,
            attrs: self.attrs,
        }
    }

    /// Union of datasets. Equal variables are kept once, differing ones fail;
    /// attributes follow the drop-conflicts policy.
    pub fn merge(datasets: Vec<Dataset>) -> Result<Dataset> {
        let attrs = combine_attrs_drop_conflicts(datasets.iter().map(|ds| &ds.attrs));
        let mut merged = Dataset::with_attrs(attrs);
        for ds in datasets {
            for (name, var) in ds.coords {
                insert_unique(&mut merged.coords, name, var)?;
            }
            for (name, var) in ds.data_vars {
                insert_unique(&mut merged.data_vars, name, var)?;
            }
        }
        merged.validate()?;
        Ok(merged)
    }
}

fn insert_unique(target: &mut IndexMap<String, Variable>, name: String, var: Variable) -> Result<()> {
    match target.get(&name) {
        Some(existing) if existing.equals(&var) => {
            debug!("merge: `{}` identical across inputs", name);
            Ok(())
        }
        Some(existing) => Err(Error::shape(
            existing.dims.first().cloned().unwrap_or_else(|| name.clone()),
            format!("conflicting values for `{}`", name),
        )),
        None => {
            target.insert(name, var);
            Ok(())
        }
    }
}

/// Keys whose values differ between inputs are dropped, all others kept
pub fn combine_attrs_drop_conflicts<'a, I>(all: I) -> Attrs
where
    I: IntoIterator<Item = &'a Attrs>,
{
    let mut combined = Attrs::new();
    let mut conflicting: Vec<String> = Vec::new();
    for attrs in all {
        for (key, value) in attrs {
            if conflicting.contains(key) {
                continue;
            }
            match combined.get(key) {
                Some(existing) if existing.same_as(value) => {}
                Some(_) => {
                    combined.shift_remove(key);
                    conflicting.push(key.clone());
                }
                None => {
                    combined.insert(key.clone(), value.clone());
                }
            }
        }
    }
    if !conflicting.is_empty() {
        debug!("dropped conflicting attributes: {:?}", conflicting);
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(dims: &[&str], values: Vec<f64>) -> Variable {
        Variable::new(dims.iter().copied(), ArrayData::from_f64(values)).unwrap()
    }

    #[test]
    fn rank_must_match_dims() {
        let err = Variable::new(["a", "b"], ArrayData::from_f64(vec![1.0])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(Variable::scalar(3.0).dims.is_empty());
    }

    #[test]
    fn validate_rejects_inconsistent_sizes() {
        let ds = Dataset::new()
            .with_variable("a", var(&["x"], vec![1.0, 2.0]))
            .with_variable("b", var(&["x"], vec![1.0]));
        assert!(matches!(ds.validate(), Err(Error::ShapeMismatch { dim, .. }) if dim == "x"));
    }

    #[test]
    fn drop_conflicts_keeps_agreeing_keys() {
        let a: Attrs = [("units".to_string(), "m".into()), ("pole".to_string(), "HH".into())]
            .into_iter()
            .collect();
        let b: Attrs = [("units".to_string(), "m".into()), ("pole".to_string(), "HV".into())]
            .into_iter()
            .collect();
        let c: Attrs = [("pole".to_string(), "VV".into())].into_iter().collect();
        let combined = combine_attrs_drop_conflicts([&a, &b, &c]);
        assert_eq!(combined.keys().collect::<Vec<_>>(), vec!["units"]);
    }

    #[test]
    fn merge_fails_on_conflicting_variables() {
        let a = Dataset::new().with_variable("v", var(&["x"], vec![1.0]));
        let b = Dataset::new().with_variable("v", var(&["x"], vec![2.0]));
        assert!(Dataset::merge(vec![a.clone(), a.clone()]).is_ok());
        assert!(Dataset::merge(vec![a, b]).is_err());
    }

    #[test]
    fn attrs_move_to_scalar_coords_and_expand() {
        let ds = Dataset::new()
            .with_variable("v", var(&["coefficients"], vec![1.0, 2.0]))
            .with_attr("sarCalibrationType", "Beta Nought")
            .move_attrs_to_coords(&["sarCalibrationType"])
            .expand_dims("sarCalibrationType");
        assert!(ds.attrs.is_empty());
        assert_eq!(ds.coords["sarCalibrationType"].dims, vec!["sarCalibrationType"]);
        assert_eq!(ds.data_vars["v"].shape(), &[1, 2]);
        ds.validate().unwrap();
    }

    #[test]
    fn reset_coords_keeps_only_index_coords() {
        let ds = Dataset::new()
            .with_coord("x", var(&["x"], vec![0.0, 1.0]))
            .with_coord("y", var(&["x"], vec![5.0, 6.0]))
            .reset_coords();
        assert_eq!(ds.coords.keys().collect::<Vec<_>>(), vec!["x"]);
        assert!(ds.data_vars.contains_key("y"));
    }
}
