//! Layout executor: declarative `(target path, source path, extractor)` rules
//! evaluated against one decoded document and assembled into a [`Tree`].
//!
//! Rules are independent of each other. [`evaluate_rules`] returns one result
//! per rule; [`build_tree`] skips failing rules and keeps the rest.
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::dataset::{Attrs, Dataset};
use crate::core::decode::{extract_dataset, extract_metadata};
use crate::core::params::ReaderOptions;
use crate::core::tree::{Tree, normalize_path};
use crate::error::{Error, Result};
use crate::types::{DecodedNode, Markers, Scalar};

/// Attribute recording the document path a dataset was decoded from
pub const PROVENANCE_ATTR: &str = "source_path";

/// Output of one rule: a single dataset, or a subtree grafted at the target
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Dataset(Dataset),
    Tree(Tree),
}

impl From<Dataset> for Node {
    fn from(ds: Dataset) -> Self {
        Node::Dataset(ds)
    }
}

impl From<Tree> for Node {
    fn from(tree: Tree) -> Self {
        Node::Tree(tree)
    }
}

/// What an extractor sees besides the sliced document
pub struct RuleContext<'a> {
    pub options: &'a ReaderOptions,
    pub markers: &'a Markers,
    pub params: &'a Attrs,
}

pub type Extractor = Arc<dyn Fn(&DecodedNode, &RuleContext<'_>) -> Result<Node> + Send + Sync>;

#[derive(Clone)]
pub struct LayoutRule {
    pub target: String,
    pub source: String,
    /// Static keyword parameters handed to the extractor
    pub params: Attrs,
    extractor: Extractor,
}

impl fmt::Debug for LayoutRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutRule")
            .field("target", &self.target)
            .field("source", &self.source)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl LayoutRule {
    pub fn new<F>(target: &str, source: &str, extractor: F) -> Self
    where
        F: Fn(&DecodedNode, &RuleContext<'_>) -> Result<Node> + Send + Sync + 'static,
    {
        Self {
            target: normalize_path(target),
            source: normalize_path(source),
            params: Attrs::new(),
            extractor: Arc::new(extractor),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// `extract_dataset` on the source, with optional caller-supplied dims
    pub fn dataset(target: &str, source: &str, dims: &[&str]) -> Self {
        let joined = dims.join(",");
        let dims: Option<Vec<String>> =
            (!dims.is_empty()).then(|| dims.iter().map(|d| d.to_string()).collect());
        let rule = Self::new(target, source, move |node, ctx| {
            extract_dataset(node, dims.as_deref(), ctx.markers).map(Node::from)
        });
        if joined.is_empty() {
            rule
        } else {
            rule.with_param("dims", joined)
        }
    }

    /// Attribute-only dataset of the source mapping
    pub fn metadata(target: &str, source: &str, collapse: &[&str]) -> Self {
        let collapse: Vec<String> = collapse.iter().map(|c| c.to_string()).collect();
        let joined = collapse.join(",");
        let rule = Self::new(target, source, move |node, ctx| {
            let collapse: Vec<&str> = collapse.iter().map(String::as_str).collect();
            extract_metadata(node, &collapse, &ctx.options.ignored_attributes, ctx.markers)
                .map(Node::from)
        });
        if joined.is_empty() {
            rule
        } else {
            rule.with_param("collapse", joined)
        }
    }
}

/// Sequential key descent; `/` is the whole document
pub fn query<'a>(doc: &'a DecodedNode, path: &str) -> Result<&'a DecodedNode> {
    let path = normalize_path(path);
    path.split('/')
        .filter(|k| !k.is_empty())
        .try_fold(doc, |node, key| node.get(key).ok_or_else(|| Error::missing(path.as_str())))
}

fn tag(ds: Dataset, source: &str) -> Dataset {
    ds.with_attr(PROVENANCE_ATTR, source)
}

pub fn evaluate_rule(doc: &DecodedNode, rule: &LayoutRule, options: &ReaderOptions) -> Result<Node> {
    debug!("evaluating layout rule {} <- {}", rule.target, rule.source);
    let node = query(doc, &rule.source)?;
    let markers = options.markers();
    let ctx = RuleContext {
        options,
        markers: &markers,
        params: &rule.params,
    };
    let out = (rule.extractor)(node, &ctx).map_err(|e| e.at(&rule.source))?;
    Ok(match out {
        Node::Dataset(ds) => Node::Dataset(tag(ds, &rule.source)),
        Node::Tree(tree) => Node::Tree(Tree::from_pairs(
            tree.into_iter().map(|(path, ds)| (path, tag(ds, &rule.source))),
        )?),
    })
}

/// Apply `f` to every item, keeping the order of `items`.
///
/// With the `parallel` feature and `max_parallelism > 1` the items run on a
/// dedicated pool of that many threads. Layout rules and sibling files both
/// fan out through here.
pub fn fan_out<T, R, F>(items: &[T], max_parallelism: Option<usize>, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    #[cfg(feature = "parallel")]
    if let Some(threads) = max_parallelism.filter(|&n| n > 1 && items.len() > 1) {
        use rayon::prelude::*;
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                debug!("fanning out {} items on {} threads", items.len(), threads);
                return pool.install(|| items.par_iter().map(&f).collect());
            }
            Err(e) => warn!("thread pool unavailable, running sequentially: {}", e),
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = max_parallelism;
    items.iter().map(f).collect()
}

/// Evaluate every rule; results line up with `rules`
pub fn evaluate_rules(doc: &DecodedNode, rules: &[LayoutRule], options: &ReaderOptions) -> Vec<Result<Node>> {
    fan_out(rules, options.max_parallelism, |rule| evaluate_rule(doc, rule, options))
}

/// Assemble the outputs of every rule into one tree.
///
/// A failing rule is logged and left out; the others still land at their
/// targets. When no rule succeeds the first failure is returned.
pub fn build_tree(doc: &DecodedNode, rules: &[LayoutRule], options: &ReaderOptions) -> Result<Tree> {
    let mut tree = Tree::new();
    let mut first_failure = None;
    let mut failed = 0;
    for (rule, result) in rules.iter().zip(evaluate_rules(doc, rules, options)) {
        match result {
            Ok(Node::Dataset(ds)) => tree = tree.insert(&rule.target, ds)?,
            Ok(Node::Tree(sub)) => tree = tree.graft(&rule.target, sub)?,
            Err(e) => {
                warn!("layout rule {} <- {} skipped: {}", rule.target, rule.source, e);
                failed += 1;
                first_failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_failure.filter(|_| failed == rules.len()) {
        return Err(e);
    }
    info!("layout produced {} nodes from {} rules ({} skipped)", tree.len(), rules.len(), failed);
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc() -> DecodedNode {
        DecodedNode::from(json!({
            "product": {
                "@xmlns": "http://example.com",
                "productId": "P1",
                "header": {"mission": "RCM", "beams": 2},
                "ellipsoid": {
                    "semiMajorAxis": {"@units": "m", "$": 6378137.0},
                    "semiMinorAxis": {"@units": "m", "$": 6356752.3}
                },
                "table": {
                    "rows": [
                        {"@beam": "a", "$": 1.5},
                        {"@beam": "b", "$": 2.5}
                    ]
                }
            }
        }))
    }

    fn rules() -> Vec<LayoutRule> {
        vec![
            LayoutRule::metadata("/", "/product", &["header"]),
            LayoutRule::dataset("/ellipsoid", "/product/ellipsoid", &["params"]),
            LayoutRule::new("/rows", "/product/table", |node, ctx| {
                extract_dataset(node, None, ctx.markers).map(Node::from)
            }),
        ]
    }

    #[test]
    fn query_descends_keys() {
        let doc = doc();
        assert_eq!(query(&doc, "/").unwrap(), &doc);
        assert!(query(&doc, "/product/header/mission").unwrap().is_scalar());
        let err = query(&doc, "/product/nothing").unwrap_err();
        assert!(matches!(err, Error::MissingPath { path } if path == "/product/nothing"));
    }

    #[test]
    fn rules_land_at_their_targets_with_provenance() {
        let tree = build_tree(&doc(), &rules(), &ReaderOptions::default()).unwrap();
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["/", "/ellipsoid", "/rows"]);
        let root = tree.get("/").unwrap();
        assert_eq!(root.attrs["mission"], Scalar::from("RCM"));
        assert!(!root.attrs.contains_key("xmlns"));
        assert_eq!(root.attrs[PROVENANCE_ATTR], Scalar::from("/product"));
        let rows = tree.get("/rows").unwrap();
        assert_eq!(rows.data_vars["rows"].dims, vec!["beam"]);
    }

    #[test]
    fn failing_rules_do_not_affect_others() {
        let mut rules = rules();
        rules.insert(1, LayoutRule::dataset("/broken", "/product/missing", &[]));
        let results = evaluate_rules(&doc(), &rules, &ReaderOptions::default());
        assert_eq!(results.len(), 4);
        assert!(matches!(results[1], Err(Error::MissingPath { .. })));
        assert!(results.iter().enumerate().all(|(i, r)| i == 1 || r.is_ok()));
    }

    #[test]
    fn missing_source_leaves_other_targets_in_the_tree() {
        let mut rules = rules();
        rules.insert(1, LayoutRule::dataset("/broken", "/product/missing", &[]));
        let tree = build_tree(&doc(), &rules, &ReaderOptions::default()).unwrap();
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["/", "/ellipsoid", "/rows"]);
        assert!(!tree.contains("/broken"));

        let err = build_tree(&doc(), &rules[1..2], &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingPath { path } if path == "/product/missing"));
    }

    #[test]
    fn fan_out_keeps_item_order() {
        let items: Vec<usize> = (0..16).collect();
        let squares = fan_out(&items, Some(4), |i| i * i);
        assert_eq!(squares, items.iter().map(|i| i * i).collect::<Vec<_>>());
        assert_eq!(fan_out(&items[..0], Some(4), |i| *i), Vec::<usize>::new());
    }

    #[test]
    fn extractor_errors_carry_the_source_path() {
        let rule = LayoutRule::dataset("/id", "/product/productId", &[]);
        let err = evaluate_rule(&doc(), &rule, &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { path, .. } if path == "/product/productId"));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let sequential = build_tree(&doc(), &rules(), &ReaderOptions::default()).unwrap();
        let options = ReaderOptions {
            max_parallelism: Some(3),
            ..ReaderOptions::default()
        };
        let parallel = build_tree(&doc(), &rules(), &options).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn subtrees_are_grafted() {
        let rule = LayoutRule::new("/grid", "/product", |_, _| {
            Tree::from_pairs([("/a", Dataset::new()), ("/b", Dataset::new())]).map(Node::from)
        });
        let tree = build_tree(&doc(), &[rule], &ReaderOptions::default()).unwrap();
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["/grid/a", "/grid/b"]);
        assert_eq!(tree.get("/grid/a").unwrap().attrs[PROVENANCE_ATTR], Scalar::from("/product"));
    }
}
