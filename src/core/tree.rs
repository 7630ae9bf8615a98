use indexmap::IndexMap;
use serde::Serialize;

use crate::core::dataset::Dataset;
use crate::error::{Error, Result};

/// Sparse, path-addressable hierarchy of datasets.
///
/// Paths are posix-style and normalised (`/`, `/a/b`); intermediate paths do
/// not need their own entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Tree {
    nodes: IndexMap<String, Dataset>,
}

/// Collapse duplicate and trailing slashes, always rooted
pub fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    format!("/{}", parts.join("/"))
}

pub fn join_path(parent: &str, child: &str) -> String {
    normalize_path(&format!("{}/{}", parent, child))
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(path, dataset)` pairs; duplicate paths are rejected
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Dataset)>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for (path, ds) in pairs {
            tree = tree.insert(path.as_ref(), ds)?;
        }
        Ok(tree)
    }

    pub fn insert(mut self, path: &str, dataset: Dataset) -> Result<Self> {
        let path = normalize_path(path);
        if self.nodes.contains_key(&path) {
            return Err(Error::schema(path, "duplicate tree path"));
        }
        self.nodes.insert(path, dataset);
        Ok(self)
    }

    /// Insert every node of `subtree` below `prefix`
    pub fn graft(mut self, prefix: &str, subtree: Tree) -> Result<Self> {
        for (path, ds) in subtree.nodes {
            self = self.insert(&join_path(prefix, &path), ds)?;
        }
        Ok(self)
    }

    pub fn get(&self, path: &str) -> Option<&Dataset> {
        self.nodes.get(&normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(&normalize_path(path))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes at or below `prefix`, paths made relative to it
    pub fn subtree(&self, prefix: &str) -> Tree {
        let prefix = normalize_path(prefix);
        let nodes = self
            .nodes
            .iter()
            .filter_map(|(path, ds)| {
                let rest = if prefix == "/" {
                    Some(path.as_str())
                } else if path == &prefix {
                    Some("/")
                } else {
                    path.strip_prefix(prefix.as_str())
                        .filter(|r| r.starts_with('/'))
                };
                rest.map(|r| (normalize_path(r), ds.clone()))
            })
            .collect();
        Tree { nodes }
    }

    /// Direct children names of `path`, including sparse intermediates
    pub fn children(&self, path: &str) -> Vec<String> {
        let base = normalize_path(path);
        let mut names: Vec<String> = Vec::new();
        for p in self.nodes.keys() {
            let rest = if base == "/" {
                p.strip_prefix('/')
            } else {
                p.strip_prefix(base.as_str()).and_then(|r| r.strip_prefix('/'))
            };
            if let Some(first) = rest.and_then(|r| r.split('/').next()).filter(|s| !s.is_empty()) {
                if !names.iter().any(|n| n == first) {
                    names.push(first.to_string());
                }
            }
        }
        names
    }

    pub fn into_nodes(self) -> IndexMap<String, Dataset> {
        self.nodes
    }
}

impl IntoIterator for Tree {
    type Item = (String, Dataset);
    type IntoIter = indexmap::map::IntoIter<String, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}
