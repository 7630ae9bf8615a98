//! Shared value types used across safetree.
//! Includes the decoded-document model (`Scalar`, `DecodedNode`), the reserved
//! key conventions (`Markers`), the structural class tag, and the typed
//! n-dimensional storage (`ArrayData`) behind every `Variable`.
use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use ndarray::{Array1, ArrayD, Axis, IxDyn};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Leaf value of a decoded document or a dataset attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(f64::from(u8::from(*b))),
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(i64::from(*b)),
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Scalar::Float(_) => None,
            Scalar::Str(s) => s.trim().parse().ok(),
        }
    }

    /// Parse XML text into the narrowest scalar it represents
    pub fn parse_text(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Scalar::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            // xsd:double spells its specials NaN, INF and -INF only
            let lower = trimmed.to_ascii_lowercase();
            let special = lower.contains("inf") || lower.contains("nan");
            if !special || matches!(trimmed, "NaN" | "INF" | "-INF") {
                return Scalar::Float(f);
            }
        }
        match trimmed {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => Scalar::Str(text.to_string()),
        }
    }

    /// Total order used for multi-index domains: numbers before strings,
    /// numbers compared by value, NaN last among numbers.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Str(_), _) => Ordering::Greater,
            (_, Scalar::Str(_)) => Ordering::Less,
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (a, b) => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                x.total_cmp(&y)
            }
        }
    }

    /// Equality where NaN equals NaN
    pub fn same_as(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Recursive value produced by the schema decoder: a scalar, an ordered
/// mapping (attributes, text content, child elements) or a list of repeated
/// sibling elements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedNode {
    Scalar(Scalar),
    Map(IndexMap<String, DecodedNode>),
    List(Vec<DecodedNode>),
}

impl DecodedNode {
    pub fn is_scalar(&self) -> bool {
        matches!(self, DecodedNode::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DecodedNode::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, DecodedNode>> {
        match self {
            DecodedNode::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DecodedNode]> {
        match self {
            DecodedNode::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DecodedNode> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl From<Scalar> for DecodedNode {
    fn from(s: Scalar) -> Self {
        DecodedNode::Scalar(s)
    }
}

impl From<serde_json::Value> for DecodedNode {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            // the schema decoder yields empty text for nil elements
            Value::Null => DecodedNode::Scalar(Scalar::Str(String::new())),
            Value::Bool(b) => DecodedNode::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DecodedNode::Scalar(Scalar::Int(i)),
                None => DecodedNode::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => DecodedNode::Scalar(Scalar::Str(s)),
            Value::Array(items) => DecodedNode::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                DecodedNode::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Reserved key conventions of the decoded document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    /// Prefix marking attribute keys
    pub attribute: String,
    /// Key holding element text content
    pub text: String,
    /// Attribute name discriminating composite value parts
    pub discriminator: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            attribute: "@".to_string(),
            text: "$".to_string(),
            discriminator: "dataStream".to_string(),
        }
    }
}

impl Markers {
    pub fn is_attribute(&self, key: &str) -> bool {
        key.starts_with(self.attribute.as_str())
    }

    pub fn is_text(&self, key: &str) -> bool {
        key == self.text
    }

    /// Attribute name without its marker
    pub fn strip<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.attribute.as_str()).unwrap_or(key)
    }

    pub fn discriminator_key(&self) -> String {
        format!("{}{}", self.attribute, self.discriminator)
    }
}

/// Shape-derived class of a decoded node
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralClass {
    Scalar,
    AttributedVariable,
    CompositeValue,
    HomogeneousArray,
    NestedRowArray,
    NestedRowDataset,
    NestedSubtree,
}

impl fmt::Display for StructuralClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StructuralClass::Scalar => "Scalar",
            StructuralClass::AttributedVariable => "AttributedVariable",
            StructuralClass::CompositeValue => "CompositeValue",
            StructuralClass::HomogeneousArray => "HomogeneousArray",
            StructuralClass::NestedRowArray => "NestedRowArray",
            StructuralClass::NestedRowDataset => "NestedRowDataset",
            StructuralClass::NestedSubtree => "NestedSubtree",
        };
        write!(f, "{}", s)
    }
}

/// Typed n-dimensional storage of a variable.
///
/// Missing cells are `NaN` (`Float`, `Complex`) or `None` (`Text`, `Time`).
/// `Int` and `Bool` have no sentinel and are promoted to `Float` when a
/// missing cell has to be written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
    Complex(ArrayD<Complex64>),
    Text(ArrayD<Option<String>>),
    Time(ArrayD<Option<NaiveDateTime>>),
}

/// Apply the same generic expression to whichever storage is active,
/// rebuilding the same variant.
macro_rules! map_storage {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($arr) => ArrayData::Bool($body),
            ArrayData::Int($arr) => ArrayData::Int($body),
            ArrayData::Float($arr) => ArrayData::Float($body),
            ArrayData::Complex($arr) => ArrayData::Complex($body),
            ArrayData::Text($arr) => ArrayData::Text($body),
            ArrayData::Time($arr) => ArrayData::Time($body),
        }
    };
}

macro_rules! with_storage {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($arr) => $body,
            ArrayData::Int($arr) => $body,
            ArrayData::Float($arr) => $body,
            ArrayData::Complex($arr) => $body,
            ArrayData::Text($arr) => $body,
            ArrayData::Time($arr) => $body,
        }
    };
}

impl ArrayData {
    /// Rank-0 array holding one scalar
    pub fn from_scalar(value: &Scalar) -> Self {
        map_storage!(Self::from_scalars(std::slice::from_ref(value)), a => a.index_axis_move(Axis(0), 0))
    }

    /// 1-D array from decoded scalars, narrowest variant that holds them all
    pub fn from_scalars(values: &[Scalar]) -> Self {
        let all = |pred: fn(&Scalar) -> bool| values.iter().all(pred);
        if !values.is_empty() && all(|v| matches!(v, Scalar::Bool(_))) {
            let data: Vec<_> = values.iter().map(|v| matches!(v, Scalar::Bool(true))).collect();
            return ArrayData::Bool(Array1::from(data).into_dyn());
        }
        if all(|v| matches!(v, Scalar::Int(_))) {
            let data: Vec<_> = values.iter().filter_map(Scalar::as_i64).collect();
            return ArrayData::Int(Array1::from(data).into_dyn());
        }
        if all(|v| matches!(v, Scalar::Int(_) | Scalar::Float(_))) {
            let data: Vec<_> = values.iter().filter_map(Scalar::as_f64).collect();
            return ArrayData::Float(Array1::from(data).into_dyn());
        }
        let data: Vec<_> = values.iter().map(|v| Some(v.to_string())).collect();
        ArrayData::Text(Array1::from(data).into_dyn())
    }

    /// 2-D array from equally long rows of scalars
    pub fn from_rows(rows: &[Vec<Scalar>]) -> Result<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
            return Err(Error::shape(
                "<row>",
                format!("ragged rows: expected {} values, found {}", ncols, bad.len()),
            ));
        }
        let flat: Vec<Scalar> = rows.iter().flatten().cloned().collect();
        Self::from_scalars(&flat).into_shape(&[rows.len(), ncols])
    }

    pub fn from_f64(values: Vec<f64>) -> Self {
        ArrayData::Float(Array1::from(values).into_dyn())
    }

    pub fn from_i64(values: Vec<i64>) -> Self {
        ArrayData::Int(Array1::from(values).into_dyn())
    }

    pub fn from_complex(values: Vec<Complex64>) -> Self {
        ArrayData::Complex(Array1::from(values).into_dyn())
    }

    pub fn from_strings<S: Into<String>>(values: Vec<S>) -> Self {
        let data: Vec<Option<String>> = values.into_iter().map(|s| Some(s.into())).collect();
        ArrayData::Text(Array1::from(data).into_dyn())
    }

    pub fn from_times(values: Vec<NaiveDateTime>) -> Self {
        let data: Vec<Option<NaiveDateTime>> = values.into_iter().map(Some).collect();
        ArrayData::Time(Array1::from(data).into_dyn())
    }

    pub fn shape(&self) -> &[usize] {
        with_storage!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        with_storage!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            ArrayData::Bool(_) => "bool",
            ArrayData::Int(_) => "int64",
            ArrayData::Float(_) => "float64",
            ArrayData::Complex(_) => "complex128",
            ArrayData::Text(_) => "str",
            ArrayData::Time(_) => "datetime",
        }
    }

    /// Whether a missing cell can be stored without promotion
    pub fn has_sentinel(&self) -> bool {
        !matches!(self, ArrayData::Bool(_) | ArrayData::Int(_))
    }

    /// `Int`/`Bool` become `Float`; every other variant is returned unchanged
    pub fn promote_for_missing(self) -> Self {
        match self {
            ArrayData::Bool(a) => ArrayData::Float(a.mapv(|b| f64::from(u8::from(b)))),
            ArrayData::Int(a) => ArrayData::Float(a.mapv(|i| i as f64)),
            other => other,
        }
    }

    /// Number of missing cells
    pub fn count_missing(&self) -> usize {
        match self {
            ArrayData::Float(a) => a.iter().filter(|v| v.is_nan()).count(),
            ArrayData::Complex(a) => a.iter().filter(|v| v.re.is_nan() && v.im.is_nan()).count(),
            ArrayData::Text(a) => a.iter().filter(|v| v.is_none()).count(),
            ArrayData::Time(a) => a.iter().filter(|v| v.is_none()).count(),
            ArrayData::Bool(_) | ArrayData::Int(_) => 0,
        }
    }

    pub fn into_shape(self, shape: &[usize]) -> Result<Self> {
        let total: usize = shape.iter().product();
        if total != self.len() {
            return Err(Error::shape(
                "<reshape>",
                format!("cannot reshape {} values into {:?}", self.len(), shape),
            ));
        }
        let shape = IxDyn(shape);
        let reshaped = map_storage!(self, a => {
            let flat: Vec<_> = a.iter().cloned().collect();
            ArrayD::from_shape_vec(shape.clone(), flat)
                .map_err(|e| Error::shape("<reshape>", e.to_string()))?
        });
        Ok(reshaped)
    }

    /// New axis of length one at `axis`
    pub fn insert_axis(self, axis: usize) -> Self {
        map_storage!(self, a => a.insert_axis(Axis(axis)))
    }

    /// Reorder axes; `order[i]` is the source axis of output axis `i`
    pub fn permute_axes(self, order: Vec<usize>) -> Self {
        map_storage!(self, a => a.permuted_axes(order.clone()).as_standard_layout().into_owned())
    }

    /// Gather positions along `axis`; `None` positions become missing cells
    pub fn take(&self, axis: usize, positions: &[Option<usize>]) -> Self {
        if positions.iter().any(Option::is_none) && !self.has_sentinel() {
            return self.clone().promote_for_missing().take(axis, positions);
        }
        match self {
            ArrayData::Bool(a) => ArrayData::Bool(take_along(a, axis, positions, false)),
            ArrayData::Int(a) => ArrayData::Int(take_along(a, axis, positions, 0)),
            ArrayData::Float(a) => ArrayData::Float(take_along(a, axis, positions, f64::NAN)),
            ArrayData::Complex(a) => ArrayData::Complex(take_along(
                a,
                axis,
                positions,
                Complex64::new(f64::NAN, f64::NAN),
            )),
            ArrayData::Text(a) => ArrayData::Text(take_along(a, axis, positions, None)),
            ArrayData::Time(a) => ArrayData::Time(take_along(a, axis, positions, None)),
        }
    }

    /// Grow `axis` to `size`, filling new trailing cells with the sentinel
    pub fn pad_axis(&self, axis: usize, size: usize) -> Self {
        let current = self.shape()[axis];
        if current >= size {
            return self.clone();
        }
        let positions: Vec<Option<usize>> =
            (0..size).map(|i| (i < current).then_some(i)).collect();
        self.take(axis, &positions)
    }

    /// Bring two arrays to a common variant so they can be concatenated
    pub fn unify(self, other: Self) -> Result<(Self, Self)> {
        use ArrayData::*;
        let same = std::mem::discriminant(&self) == std::mem::discriminant(&other);
        if same {
            return Ok((self, other));
        }
        match (self, other) {
            (a @ (Bool(_) | Int(_) | Float(_)), b @ (Bool(_) | Int(_) | Float(_))) => {
                Ok((a.promote_for_missing(), b.promote_for_missing()))
            }
            (a @ (Bool(_) | Int(_) | Float(_)), Complex(b)) => Ok((a.into_complex()?, Complex(b))),
            (Complex(a), b @ (Bool(_) | Int(_) | Float(_))) => Ok((Complex(a), b.into_complex()?)),
            (a, b) => Err(Error::shape(
                "<dtype>",
                format!("cannot combine {} with {}", a.dtype(), b.dtype()),
            )),
        }
    }

    fn into_complex(self) -> Result<Self> {
        match self.promote_for_missing() {
            ArrayData::Float(a) => Ok(ArrayData::Complex(a.mapv(|re| Complex64::new(re, 0.0)))),
            ArrayData::Complex(a) => Ok(ArrayData::Complex(a)),
            other => Err(Error::shape(
                "<dtype>",
                format!("{} is not numeric", other.dtype()),
            )),
        }
    }

    /// Concatenate along an existing axis; variants are unified first
    pub fn concatenate(arrays: Vec<Self>, axis: usize) -> Result<Self> {
        let Some(first) = arrays.first().map(Self::kind_witness) else {
            return Err(Error::shape("<concat>", "nothing to concatenate"));
        };
        let witness = arrays
            .iter()
            .skip(1)
            .try_fold(first, |w, p| w.unify(p.kind_witness()).map(|(w, _)| w))?;
        let parts = arrays
            .into_iter()
            .map(|p| p.unify(witness.clone()).map(|(p, _)| p))
            .collect::<Result<Vec<_>>>()?;
        concat_same(parts, axis)
    }

    /// Empty array of the same variant
    fn kind_witness(&self) -> Self {
        map_storage!(self, _a => Array1::from(Vec::new()).into_dyn())
    }

    /// Flat values as `f64`; `None` for non-numeric storage
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            ArrayData::Bool(a) => Some(a.iter().map(|&b| f64::from(u8::from(b))).collect()),
            ArrayData::Int(a) => Some(a.iter().map(|&i| i as f64).collect()),
            ArrayData::Float(a) => Some(a.iter().copied().collect()),
            _ => None,
        }
    }

    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            ArrayData::Bool(a) => Some(a.iter().map(|&b| i64::from(b)).collect()),
            ArrayData::Int(a) => Some(a.iter().copied().collect()),
            _ => None,
        }
    }

    /// Flat values as scalars (text and times as strings, complex as `a+bj`)
    pub fn to_scalars(&self) -> Vec<Scalar> {
        match self {
            ArrayData::Bool(a) => a.iter().map(|&b| Scalar::Bool(b)).collect(),
            ArrayData::Int(a) => a.iter().map(|&i| Scalar::Int(i)).collect(),
            ArrayData::Float(a) => a.iter().map(|&f| Scalar::Float(f)).collect(),
            ArrayData::Complex(a) => a
                .iter()
                .map(|c| Scalar::Str(format!("{}{:+}j", c.re, c.im)))
                .collect(),
            ArrayData::Text(a) => a
                .iter()
                .map(|s| Scalar::Str(s.clone().unwrap_or_default()))
                .collect(),
            ArrayData::Time(a) => a
                .iter()
                .map(|t| Scalar::Str(t.map(|t| t.to_string()).unwrap_or_default()))
                .collect(),
        }
    }

    /// Value equality where missing equals missing
    pub fn same_values(&self, other: &Self) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        match (self, other) {
            (ArrayData::Float(a), ArrayData::Float(b)) => a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| x == y || (x.is_nan() && y.is_nan())),
            (ArrayData::Complex(a), ArrayData::Complex(b)) => a.iter().zip(b.iter()).all(|(x, y)| {
                x == y || (x.re.is_nan() && y.re.is_nan() && x.im.is_nan() && y.im.is_nan())
            }),
            (a, b) => a == b,
        }
    }
}

fn take_along<T: Clone>(
    arr: &ArrayD<T>,
    axis: usize,
    positions: &[Option<usize>],
    fill: T,
) -> ArrayD<T> {
    let mut shape = arr.shape().to_vec();
    shape[axis] = positions.len();
    let mut out = ArrayD::from_elem(IxDyn(&shape), fill);
    for (dst, src) in positions.iter().enumerate() {
        if let Some(src) = src {
            out.index_axis_mut(Axis(axis), dst)
                .assign(&arr.index_axis(Axis(axis), *src));
        }
    }
    out
}

fn concat_same(parts: Vec<ArrayData>, axis: usize) -> Result<ArrayData> {
    fn join<T: Clone>(arrays: Vec<ArrayD<T>>, axis: usize) -> Result<ArrayD<T>> {
        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        ndarray::concatenate(Axis(axis), &views).map_err(|e| Error::shape("<concat>", e.to_string()))
    }
    macro_rules! collect_variant {
        ($variant:ident) => {{
            let arrays = parts
                .into_iter()
                .map(|p| match p {
                    ArrayData::$variant(a) => Ok(a),
                    other => Err(Error::shape(
                        "<concat>",
                        format!("mixed storage {}", other.dtype()),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ArrayData::$variant(join(arrays, axis)?))
        }};
    }
    match parts.first() {
        Some(ArrayData::Bool(_)) => collect_variant!(Bool),
        Some(ArrayData::Int(_)) => collect_variant!(Int),
        Some(ArrayData::Float(_)) => collect_variant!(Float),
        Some(ArrayData::Complex(_)) => collect_variant!(Complex),
        Some(ArrayData::Text(_)) => collect_variant!(Text),
        Some(ArrayData::Time(_)) => collect_variant!(Time),
        None => Err(Error::shape("<concat>", "nothing to concatenate")),
    }
}
