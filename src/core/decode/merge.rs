//! Sibling merging: datasets decoded from parallel document sections (one
//! per polarisation, beam or calibration type) are aligned on their index
//! coordinates, padded to common sizes and stacked along a new labelled
//! dimension.
use indexmap::IndexMap;
use tracing::debug;

use crate::core::dataset::{Attrs, Dataset, Variable, combine_attrs_drop_conflicts};
use crate::error::{Error, Result};
use crate::types::{ArrayData, Scalar};

/// Pad every dataset to the largest size seen for each dimension.
///
/// Padding is positional: existing cells keep their index and new trailing
/// cells are missing.
pub fn pad_common(datasets: Vec<Dataset>) -> Vec<Dataset> {
    let mut sizes: IndexMap<String, usize> = IndexMap::new();
    for ds in &datasets {
        for (dim, size) in ds.sizes() {
            let entry = sizes.entry(dim).or_insert(size);
            *entry = (*entry).max(size);
        }
    }
    datasets
        .into_iter()
        .map(|ds| {
            let pad = |vars: IndexMap<String, Variable>| -> IndexMap<String, Variable> {
                vars.into_iter().map(|(k, v)| (k, v.pad_to(&sizes))).collect()
            };
            Dataset {
                data_vars: pad(ds.data_vars),
                coords: pad(ds.coords),
                attrs: ds.attrs,
            }
        })
        .collect()
}

/// Merge sibling datasets along a new leading dimension `label_dim` whose
/// coordinate holds `labels`.
///
/// Every sibling must carry the same data variables with the same
/// dimensions. A dimension indexed by a coordinate of its own name is
/// reindexed on the sorted union of the siblings' labels; other dimensions
/// are padded positionally. Remaining coordinates equal across siblings are
/// kept once, differing ones gain `label_dim`. Attributes that disagree are
/// dropped.
pub fn merge_siblings<I, S>(datasets: Vec<Dataset>, labels: I, label_dim: &str) -> Result<Dataset>
where
    I: IntoIterator<Item = S>,
    S: Into<Scalar>,
{
    let labels: Vec<Scalar> = labels.into_iter().map(Into::into).collect();
    if datasets.is_empty() {
        return Err(Error::shape(label_dim, "no siblings to merge"));
    }
    if labels.len() != datasets.len() {
        return Err(Error::shape(
            label_dim,
            format!("{} labels for {} siblings", labels.len(), datasets.len()),
        ));
    }
    debug!("merging {} siblings along `{}`", datasets.len(), label_dim);
    let attrs = combine_attrs_drop_conflicts(datasets.iter().map(|ds| &ds.attrs));
    let padded = pad_common(align_indexes(datasets, label_dim)?);

    let mut merged = Dataset::with_attrs(attrs);
    merged.coords.insert(
        label_dim.to_string(),
        Variable::new([label_dim], ArrayData::from_scalars(&labels))?,
    );
    for name in names(&padded, |ds| &ds.coords) {
        if name == label_dim {
            continue;
        }
        let parts = gather(&padded, &name, |ds| &ds.coords, label_dim)?;
        let first = parts[0];
        if parts.iter().all(|p| p.equals(first)) {
            merged.coords.insert(name, first.clone());
        } else {
            merged.coords.insert(name, stack(&parts, label_dim)?);
        }
    }
    for name in names(&padded, |ds| &ds.data_vars) {
        let parts = gather(&padded, &name, |ds| &ds.data_vars, label_dim)?;
        merged.data_vars.insert(name, stack(&parts, label_dim)?);
    }
    merged.validate()?;
    Ok(merged)
}

/// Reindex every sibling on the union of the index coordinates that differ
/// between siblings. Labels a sibling lacks become missing cells.
fn align_indexes(mut datasets: Vec<Dataset>, label_dim: &str) -> Result<Vec<Dataset>> {
    let mut indexed: Vec<String> = Vec::new();
    for ds in &datasets {
        for (name, coord) in &ds.coords {
            if name != label_dim && coord.is_index_of(name) && !indexed.contains(name) {
                indexed.push(name.clone());
            }
        }
    }
    for dim in indexed {
        let union = {
            let indexes: Vec<&Variable> = datasets
                .iter()
                .filter_map(|ds| ds.coords.get(&dim))
                .filter(|c| c.is_index_of(&dim))
                .collect();
            if indexes.iter().all(|c| c.equals(indexes[0])) {
                continue;
            }
            let all = ArrayData::concatenate(indexes.iter().map(|c| c.data.clone()).collect(), 0)
                .map_err(|e| Error::shape(dim.as_str(), e.to_string()))?;
            sorted_unique(&all)
        };
        debug!("aligning `{}` on {} labels", dim, union.len());
        datasets = datasets.into_iter().map(|ds| reindex(ds, &dim, &union)).collect();
    }
    Ok(datasets)
}

fn sorted_unique(values: &ArrayData) -> ArrayData {
    let scalars = values.to_scalars();
    let mut order: Vec<usize> = (0..scalars.len()).collect();
    order.sort_by(|&a, &b| scalars[a].total_cmp(&scalars[b]));
    order.dedup_by(|a, b| scalars[*a].same_as(&scalars[*b]));
    let positions: Vec<Option<usize>> = order.into_iter().map(Some).collect();
    values.take(0, &positions)
}

/// Put `ds` on the labels of `index` along `dim`
fn reindex(ds: Dataset, dim: &str, index: &ArrayData) -> Dataset {
    let Some(own) = ds.coords.get(dim).filter(|c| c.is_index_of(dim)) else {
        return ds;
    };
    let labels = own.data.to_scalars();
    let positions: Vec<Option<usize>> = index
        .to_scalars()
        .iter()
        .map(|label| labels.iter().position(|l| l.same_as(label)))
        .collect();
    let take = |vars: IndexMap<String, Variable>| -> IndexMap<String, Variable> {
        vars.into_iter()
            .map(|(name, var)| match var.axis_of(dim) {
                Some(axis) => {
                    let data = var.data.take(axis, &positions);
                    (name, Variable { data, ..var })
                }
                None => (name, var),
            })
            .collect()
    };
    let mut coords = take(ds.coords);
    if let Some(own) = coords.get_mut(dim) {
        own.data = index.clone();
    }
    Dataset {
        data_vars: take(ds.data_vars),
        coords,
        attrs: ds.attrs,
    }
}

/// Variable names in order of first appearance across siblings
fn names<F>(datasets: &[Dataset], section: F) -> Vec<String>
where
    F: Fn(&Dataset) -> &IndexMap<String, Variable>,
{
    let mut out: Vec<String> = Vec::new();
    for ds in datasets {
        for name in section(ds).keys() {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    out
}

fn gather<'a, F>(
    datasets: &'a [Dataset],
    name: &str,
    section: F,
    label_dim: &str,
) -> Result<Vec<&'a Variable>>
where
    F: Fn(&'a Dataset) -> &'a IndexMap<String, Variable>,
{
    let parts = datasets
        .iter()
        .enumerate()
        .map(|(i, ds)| {
            section(ds).get(name).ok_or_else(|| {
                Error::shape(label_dim, format!("sibling {} has no variable `{}`", i, name))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if let Some(odd) = parts.iter().find(|p| p.dims != parts[0].dims) {
        return Err(Error::shape(
            label_dim,
            format!("`{}` has dims {:?} and {:?} across siblings", name, parts[0].dims, odd.dims),
        ));
    }
    Ok(parts)
}

fn stack(parts: &[&Variable], label_dim: &str) -> Result<Variable> {
    let attrs: Attrs = combine_attrs_drop_conflicts(parts.iter().map(|p| &p.attrs));
    let data = ArrayData::concatenate(
        parts.iter().map(|p| p.data.clone().insert_axis(0)).collect(),
        0,
    )?;
    let mut dims = vec![label_dim.to_string()];
    dims.extend(parts[0].dims.iter().cloned());
    Ok(Variable::new(dims, data)?.with_attrs(attrs))
}
