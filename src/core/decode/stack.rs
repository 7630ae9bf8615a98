//! Multi-index unstacking.
//!
//! A dimension whose rows are labelled by several 1-D coordinates (the
//! levels) is replaced by one dimension per level. Each new dimension spans
//! the sorted distinct values of its level; cells with no source row are
//! missing.
use indexmap::IndexMap;
use tracing::debug;

use crate::core::dataset::{DataArray, Dataset, Variable};
use crate::error::{Error, Result};
use crate::types::Scalar;

/// Anonymous row dimension shared by several index columns
pub const STACKED_DIM: &str = "stacked";

/// Where each source row lands in the dense grid
struct Grid {
    levels: IndexMap<String, Variable>,
    sizes: Vec<usize>,
    /// Source row of every flat cell, row-major over the levels
    positions: Vec<Option<usize>>,
}

impl Grid {
    fn plan(coords: &IndexMap<String, Variable>, dim: &str) -> Result<Option<Self>> {
        let level_vars: Vec<(&String, &Variable)> =
            coords.iter().filter(|(_, c)| c.dims == [dim]).collect();
        if level_vars.len() < 2 {
            return Ok(None);
        }
        let nrows = level_vars[0].1.shape()[0];
        let mut levels = IndexMap::new();
        let mut sizes = Vec::with_capacity(level_vars.len());
        let mut codes: Vec<Vec<usize>> = Vec::with_capacity(level_vars.len());
        for (name, var) in &level_vars {
            let values = var.data.to_scalars();
            let mut order: Vec<usize> = (0..values.len()).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            order.dedup_by(|a, b| values[*a].same_as(&values[*b]));
            let domain: Vec<&Scalar> = order.iter().map(|&i| &values[i]).collect();
            let level_codes = values
                .iter()
                .map(|v| {
                    domain
                        .binary_search_by(|d| d.total_cmp(v))
                        .map_err(|_| Error::shape(dim, format!("level `{}` value {} not indexed", name, v)))
                })
                .collect::<Result<Vec<_>>>()?;
            let firsts: Vec<Option<usize>> = order.iter().copied().map(Some).collect();
            let coord = Variable::new([name.as_str()], var.data.take(0, &firsts))?
                .with_attrs(var.attrs.clone());
            sizes.push(domain.len());
            codes.push(level_codes);
            levels.insert((*name).clone(), coord);
        }

        let total: usize = sizes.iter().product();
        let mut positions = vec![None; total];
        for row in 0..nrows {
            let flat = codes
                .iter()
                .zip(&sizes)
                .fold(0, |acc, (level, size)| acc * size + level[row]);
            if let Some(previous) = positions[flat] {
                return Err(Error::shape(
                    dim,
                    format!("rows {} and {} share the same index values", previous, row),
                ));
            }
            positions[flat] = Some(row);
        }
        debug!(
            "unstack `{}`: {} rows into {:?} over {:?}",
            dim,
            nrows,
            sizes,
            levels.keys().collect::<Vec<_>>()
        );
        Ok(Some(Self {
            levels,
            sizes,
            positions,
        }))
    }

    /// Replace `dim` of `var` by the level dimensions, appended last
    fn apply(&self, var: Variable, dim: &str) -> Result<Variable> {
        let Some(axis) = var.axis_of(dim) else {
            return Ok(var);
        };
        let ndim = var.dims.len();
        let order: Vec<usize> = (0..ndim).filter(|&a| a != axis).chain([axis]).collect();
        let mut dims: Vec<String> = var.dims.iter().filter(|d| *d != dim).cloned().collect();
        let mut shape: Vec<usize> = order[..ndim - 1].iter().map(|&a| var.shape()[a]).collect();
        dims.extend(self.levels.keys().cloned());
        shape.extend(&self.sizes);
        let data = var
            .data
            .permute_axes(order)
            .take(ndim - 1, &self.positions)
            .into_shape(&shape)?;
        Ok(Variable::new(dims, data)?.with_attrs(var.attrs))
    }

    fn apply_all(
        &self,
        vars: IndexMap<String, Variable>,
        dim: &str,
    ) -> Result<IndexMap<String, Variable>> {
        vars.into_iter()
            .filter(|(name, _)| !self.levels.contains_key(name))
            .map(|(name, var)| self.apply(var, dim).map(|v| (name, v)))
            .collect()
    }

    fn check_names(&self, dim: &str, existing: &IndexMap<String, usize>) -> Result<()> {
        match self.levels.keys().find(|l| existing.contains_key(*l) && l.as_str() != dim) {
            Some(clash) => Err(Error::shape(
                clash.as_str(),
                format!("cannot unstack `{}`: dimension already exists", dim),
            )),
            None => Ok(()),
        }
    }
}

/// Unstack `dim` of every variable using the 1-D coordinates along it as
/// levels. Fewer than two levels leaves the dataset unchanged.
pub fn unstack_dataset(ds: Dataset, dim: &str) -> Result<Dataset> {
    let Some(grid) = Grid::plan(&ds.coords, dim)? else {
        return Ok(ds);
    };
    grid.check_names(dim, &ds.sizes())?;
    let mut coords = grid.levels.clone();
    coords.extend(grid.apply_all(ds.coords, dim)?);
    let unstacked = Dataset {
        data_vars: grid.apply_all(ds.data_vars, dim)?,
        coords,
        attrs: ds.attrs,
    };
    unstacked.validate()?;
    Ok(unstacked)
}

pub fn unstack_data_array(da: DataArray, dim: &str) -> Result<DataArray> {
    let Some(grid) = Grid::plan(&da.coords, dim)? else {
        return Ok(da);
    };
    let sizes: IndexMap<String, usize> = da
        .variable
        .sizes()
        .map(|(d, s)| (d.to_string(), s))
        .collect();
    grid.check_names(dim, &sizes)?;
    let mut coords = grid.levels.clone();
    coords.extend(grid.apply_all(da.coords, dim)?);
    Ok(DataArray {
        name: da.name,
        variable: grid.apply(da.variable, dim)?,
        coords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArrayData;
    use pretty_assertions::assert_eq;

    fn stacked(xs: Vec<i64>, ys: Vec<i64>, values: Vec<f64>) -> Dataset {
        Dataset::new()
            .with_coord("x", Variable::new([STACKED_DIM], ArrayData::from_i64(xs)).unwrap())
            .with_coord("y", Variable::new([STACKED_DIM], ArrayData::from_i64(ys)).unwrap())
            .with_variable("v", Variable::new([STACKED_DIM], ArrayData::from_f64(values)).unwrap())
    }

    #[test]
    fn sparse_rows_leave_missing_cells() {
        // 3 x 4 grid with 10 of 12 cells present, given out of order
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut values = Vec::new();
        for x in (0..3).rev() {
            for y in 0..4 {
                if (x, y) == (1, 2) || (x, y) == (2, 0) {
                    continue;
                }
                xs.push(x * 10);
                ys.push(y);
                values.push((x * 4 + y) as f64);
            }
        }
        let ds = unstack_dataset(stacked(xs, ys, values), STACKED_DIM).unwrap();
        let v = &ds.data_vars["v"];
        assert_eq!(v.dims, vec!["x", "y"]);
        assert_eq!(v.shape(), &[3, 4]);
        assert_eq!(v.data.count_missing(), 2);
        assert_eq!(ds.coords["x"].data.to_i64_vec(), Some(vec![0, 10, 20]));
        let flat = v.data.to_f64_vec().unwrap();
        assert_eq!(flat[4 + 1], 5.0);
        assert!(flat[4 + 2].is_nan());
        assert!(flat[8].is_nan());
    }

    #[test]
    fn integer_data_is_promoted_only_when_cells_are_missing() {
        let full = Dataset::new()
            .with_coord("x", Variable::new([STACKED_DIM], ArrayData::from_i64(vec![0, 0, 1, 1])).unwrap())
            .with_coord("y", Variable::new([STACKED_DIM], ArrayData::from_i64(vec![0, 1, 0, 1])).unwrap())
            .with_variable(
                "v",
                Variable::new([STACKED_DIM], ArrayData::from_i64(vec![1, 2, 3, 4])).unwrap(),
            );
        let ds = unstack_dataset(full, STACKED_DIM).unwrap();
        assert_eq!(ds.data_vars["v"].data.to_i64_vec(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn duplicate_index_tuples_fail() {
        let ds = stacked(vec![0, 0], vec![1, 1], vec![1.0, 2.0]);
        let err = unstack_dataset(ds, STACKED_DIM).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn single_level_is_left_alone() {
        let ds = Dataset::new()
            .with_coord("x", Variable::new([STACKED_DIM], ArrayData::from_i64(vec![1, 2])).unwrap())
            .with_variable("v", Variable::new([STACKED_DIM], ArrayData::from_f64(vec![1.0, 2.0])).unwrap());
        let same = unstack_dataset(ds.clone(), STACKED_DIM).unwrap();
        assert_eq!(same, ds);
    }

    #[test]
    fn other_dimensions_come_first() {
        let da = DataArray {
            name: Some("v".into()),
            variable: Variable::new(
                [STACKED_DIM, "band"],
                ArrayData::from_f64(vec![1.0, 2.0, 3.0, 4.0]).into_shape(&[2, 2]).unwrap(),
            )
            .unwrap(),
            coords: [
                ("a".to_string(), Variable::new([STACKED_DIM], ArrayData::from_strings(vec!["p", "q"])).unwrap()),
                ("b".to_string(), Variable::new([STACKED_DIM], ArrayData::from_i64(vec![7, 7])).unwrap()),
            ]
            .into_iter()
            .collect(),
        };
        let out = unstack_data_array(da, STACKED_DIM).unwrap();
        assert_eq!(out.variable.dims, vec!["band", "a", "b"]);
        assert_eq!(out.variable.shape(), &[2, 2, 1]);
        assert_eq!(out.variable.data.to_f64_vec(), Some(vec![1.0, 3.0, 2.0, 4.0]));
    }
}
