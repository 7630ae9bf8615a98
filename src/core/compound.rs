//! Compound-variable executor.
//!
//! Primitive values are decoded upstream (an XPath selects raw strings, a
//! conversion from [`convert`] types them). A [`CompoundSpec`] names a
//! builder and the primitive keys it takes; the executor resolves the keys
//! and calls the builder positionally. Shape reconciliation belongs to the
//! builders.
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::core::dataset::{Dataset, Variable};
use crate::core::tree::Tree;
use crate::error::{Error, Result};
use crate::types::{ArrayData, Scalar};

/// Typed primitive value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Time(NaiveDateTime),
    Array(ArrayData),
    /// Rows of differing lengths, one 1-D array each
    Ragged(Vec<ArrayData>),
}

/// A decoded primitive and the XPath expression it came from
#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub value: Value,
    pub source: String,
}

impl Primitive {
    pub fn new(value: Value, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::schema(self.source.as_str(), format!("expected {}", expected))
    }

    pub fn scalar(&self) -> Result<&Scalar> {
        match &self.value {
            Value::Scalar(s) => Ok(s),
            _ => Err(self.mismatch("a scalar")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.scalar()?.as_f64().ok_or_else(|| self.mismatch("a number"))
    }

    pub fn as_i64(&self) -> Result<i64> {
        self.scalar()?.as_i64().ok_or_else(|| self.mismatch("an integer"))
    }

    pub fn as_text(&self) -> Result<String> {
        Ok(self.scalar()?.to_string())
    }

    pub fn array(&self) -> Result<&ArrayData> {
        match &self.value {
            Value::Array(a) => Ok(a),
            _ => Err(self.mismatch("an array")),
        }
    }

    pub fn rows(&self) -> Result<&[ArrayData]> {
        match &self.value {
            Value::Ragged(rows) => Ok(rows),
            _ => Err(self.mismatch("a list of arrays")),
        }
    }

    /// Rank-0 variable of a scalar or time value, tagged with its source
    pub fn to_scalar_variable(&self) -> Result<Variable> {
        let data = match &self.value {
            Value::Scalar(s) => ArrayData::from_scalar(s),
            Value::Time(t) => ArrayData::from_times(vec![*t]).into_shape(&[])?,
            _ => return Err(self.mismatch("a scalar")),
        };
        Ok(Variable::new(Vec::<String>::new(), data)?.with_attr("source", self.source.as_str()))
    }

    /// Variable over `dims` holding this array, tagged with its source
    pub fn to_variable(&self, dims: &[&str]) -> Result<Variable> {
        Ok(Variable::new(dims.iter().copied(), self.array()?.clone())?
            .with_attr("source", self.source.as_str()))
    }
}

/// Builder invoked positionally with the resolved primitives
pub type Builder = fn(&[Primitive]) -> Result<Dataset>;

/// Builder plus the ordered primitive keys it consumes
#[derive(Clone, Debug)]
pub struct CompoundSpec {
    pub builder: Builder,
    pub args: Vec<String>,
}

impl CompoundSpec {
    pub fn new<I, S>(builder: Builder, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            builder,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

pub type Primitives = IndexMap<String, Primitive>;

/// Look up every argument key of `spec`, in order
pub fn resolve<'a>(primitives: &'a Primitives, spec: &CompoundSpec) -> Result<Vec<&'a Primitive>> {
    spec.args
        .iter()
        .map(|key| primitives.get(key).ok_or_else(|| Error::missing(key.as_str())))
        .collect()
}

pub fn execute(primitives: &Primitives, spec: &CompoundSpec) -> Result<Dataset> {
    let args: Vec<Primitive> = resolve(primitives, spec)?.into_iter().cloned().collect();
    let ds = (spec.builder)(&args)?;
    ds.validate()?;
    Ok(ds)
}

/// Run every spec of a catalog; each result lands at `/<name>`
pub fn execute_catalog(primitives: &Primitives, catalog: &IndexMap<String, CompoundSpec>) -> Result<Tree> {
    let mut tree = Tree::new();
    for (name, spec) in catalog {
        debug!("building compound `{}` from {:?}", name, spec.args);
        let ds = execute(primitives, spec).map_err(|e| match e {
            Error::Builder { reason, .. } => Error::builder(name.as_str(), reason),
            other => other,
        })?;
        tree = tree.insert(name, ds)?;
    }
    info!("built {} compound variables", tree.len());
    Ok(tree)
}

/// Fixed-arity view of the builder arguments
pub fn expect_args<'a, const N: usize>(name: &str, args: &'a [Primitive]) -> Result<&'a [Primitive; N]> {
    args.try_into().map_err(|_| {
        Error::builder(name, format!("takes {} arguments, got {}", N, args.len()))
    })
}

/// Conversions from the raw strings an XPath selects to typed values.
pub mod convert {
    use chrono::NaiveDateTime;

    use super::Value;
    use crate::error::{Error, Result};
    use crate::types::{ArrayData, Scalar};

    pub type Convert = fn(&[String]) -> Result<Value>;

    const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    fn first(texts: &[String]) -> Result<&str> {
        texts
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::schema("<xpath>", "no value selected"))
    }

    fn parse_f64(text: &str) -> Result<f64> {
        text.trim()
            .parse()
            .map_err(|_| Error::schema("<xpath>", format!("`{}` is not a float", text)))
    }

    fn parse_i64(text: &str) -> Result<i64> {
        text.trim()
            .parse()
            .map_err(|_| Error::schema("<xpath>", format!("`{}` is not an integer", text)))
    }

    fn parse_date(text: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text.trim(), DATE_FORMAT)
            .map_err(|e| Error::schema("<xpath>", format!("`{}` is not a date: {}", text, e)))
    }

    fn tokens<T>(text: &str, parse: fn(&str) -> Result<T>) -> Result<Vec<T>> {
        text.split_whitespace().map(parse).collect()
    }

    pub fn scalar(texts: &[String]) -> Result<Value> {
        Ok(Value::Scalar(Scalar::parse_text(first(texts)?)))
    }

    pub fn scalar_int(texts: &[String]) -> Result<Value> {
        Ok(Value::Scalar(Scalar::Int(parse_i64(first(texts)?)?)))
    }

    pub fn scalar_float(texts: &[String]) -> Result<Value> {
        Ok(Value::Scalar(Scalar::Float(parse_f64(first(texts)?)?)))
    }

    pub fn date(texts: &[String]) -> Result<Value> {
        Ok(Value::Time(parse_date(first(texts)?)?))
    }

    pub fn datetime_array(texts: &[String]) -> Result<Value> {
        let times = texts.iter().map(|t| parse_date(t)).collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(ArrayData::from_times(times)))
    }

    pub fn int_array(texts: &[String]) -> Result<Value> {
        let values = texts.iter().map(|t| parse_i64(t)).collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(ArrayData::from_i64(values)))
    }

    pub fn float_array(texts: &[String]) -> Result<Value> {
        let values = texts.iter().map(|t| parse_f64(t)).collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(ArrayData::from_f64(values)))
    }

    pub fn bool_array(texts: &[String]) -> Result<Value> {
        let values: Vec<Scalar> = texts
            .iter()
            .map(|t| match t.trim() {
                "true" | "1" => Ok(Scalar::Bool(true)),
                "false" | "0" => Ok(Scalar::Bool(false)),
                other => Err(Error::schema("<xpath>", format!("`{}` is not a boolean", other))),
            })
            .collect::<Result<_>>()?;
        Ok(Value::Array(ArrayData::from_scalars(&values)))
    }

    pub fn text_array(texts: &[String]) -> Result<Value> {
        Ok(Value::Array(ArrayData::from_strings(texts.to_vec())))
    }

    /// Distinct values in ascending order
    pub fn uniq_sorted(texts: &[String]) -> Result<Value> {
        let mut values: Vec<Scalar> = texts.iter().map(|t| Scalar::parse_text(t)).collect();
        values.sort_by(Scalar::total_cmp);
        values.dedup_by(|a, b| a.same_as(b));
        Ok(Value::Array(ArrayData::from_scalars(&values)))
    }

    /// Whitespace-separated integers of the first selected string
    pub fn int_array_from_joined(texts: &[String]) -> Result<Value> {
        Ok(Value::Array(ArrayData::from_i64(tokens(first(texts)?, parse_i64)?)))
    }

    pub fn float_array_from_joined(texts: &[String]) -> Result<Value> {
        Ok(Value::Array(ArrayData::from_f64(tokens(first(texts)?, parse_f64)?)))
    }

    /// One row per selected string; rows must be equally long
    pub fn float_rows_from_strings(texts: &[String]) -> Result<Value> {
        let rows = texts
            .iter()
            .map(|t| tokens(t, parse_f64).map(|r| r.into_iter().map(Scalar::Float).collect()))
            .collect::<Result<Vec<Vec<Scalar>>>>()?;
        Ok(Value::Array(ArrayData::from_rows(&rows)?.promote_for_missing()))
    }

    /// One 1-D array per selected string, lengths may differ
    pub fn float_arrays_from_strings(texts: &[String]) -> Result<Value> {
        let rows = texts
            .iter()
            .map(|t| tokens(t, parse_f64).map(ArrayData::from_f64))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Ragged(rows))
    }

    pub fn int_arrays_from_strings(texts: &[String]) -> Result<Value> {
        let rows = texts
            .iter()
            .map(|t| tokens(t, parse_i64).map(ArrayData::from_i64))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Ragged(rows))
    }
}
