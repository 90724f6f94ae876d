//! Typed hyperparameter values, configurations and tuning grids
//!
//! A [`Params`] is the configuration a classifier family is built from. It is
//! forwarded opaquely by the facade; each family reads its own keys through a
//! [`ParamReader`], which rejects keys the family does not know.
//!
//! A [`ParamGrid`] maps parameter names to candidate values. Its Cartesian
//! product is enumerated in sorted key order with the last key varying
//! fastest.

use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Get as float (integers widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }
}

/// Renders values the way parameter sets are keyed in tuning reports:
/// strings single-quoted, `True`/`False`/`None`, lists as tuples.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Bool(true) => write!(f, "True"),
            ParamValue::Bool(false) => write!(f, "False"),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", format_float(*v)),
            ParamValue::Str(s) => write!(f, "'{}'", s),
            ParamValue::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Shortest round-trip float text with a two-digit signed exponent (`1e-05`).
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let text = format!("{:?}", v);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        ParamValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => ParamValue::None,
        }
    }
}

/// Configuration used to construct a classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Copy of `self` with every entry of `overrides` applied on top
    pub fn merged(&self, overrides: &Params) -> Params {
        let mut merged = self.clone();
        for (key, value) in overrides.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// `key=value` pairs in key order, joined by `", "`
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A grid with one candidate per key: the configured value
    pub fn to_grid(&self) -> ParamGrid {
        let mut grid = ParamGrid::new();
        for (key, value) in self.iter() {
            grid.insert(key.clone(), vec![value.clone()]);
        }
        grid
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Candidate values per hyperparameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid(BTreeMap<String, Vec<ParamValue>>);

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.0.insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Vec<ParamValue>) {
        self.0.insert(key.into(), values);
    }

    pub fn get(&self, key: &str) -> Option<&[ParamValue]> {
        self.0.get(key).map(|v| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// True when no parameter is being searched
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size of the Cartesian product (an empty grid has one empty candidate)
    pub fn n_candidates(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    /// Enumerate every candidate configuration
    pub fn candidates(&self) -> Result<Vec<Params>> {
        let mut configs = vec![Params::new()];
        for (key, values) in &self.0 {
            if values.is_empty() {
                return Err(ClassifierError::ConfigError(format!(
                    "Parameter grid value for '{}' must be a non-empty sequence",
                    key
                )));
            }
            let mut seen = BTreeSet::new();
            if let Some(dup) = values.iter().find(|v| !seen.insert(v.to_string())) {
                return Err(ClassifierError::ConfigError(format!(
                    "Parameter grid value {} is listed more than once for '{}'",
                    dup, key
                )));
            }
            let mut next = Vec::with_capacity(configs.len() * values.len());
            for config in &configs {
                for value in values {
                    next.push(config.clone().with(key.clone(), value.clone()));
                }
            }
            configs = next;
        }
        Ok(configs)
    }
}

impl From<&Params> for ParamGrid {
    fn from(params: &Params) -> Self {
        params.to_grid()
    }
}

/// Reads a family's parameters out of a [`Params`], applying defaults and
/// rejecting keys the family does not accept.
pub struct ParamReader<'a> {
    family: &'static str,
    params: &'a Params,
    consumed: BTreeSet<&'static str>,
}

impl<'a> ParamReader<'a> {
    pub fn new(family: &'static str, params: &'a Params) -> Self {
        Self {
            family,
            params,
            consumed: BTreeSet::new(),
        }
    }

    /// Raw value for `key`, marking it as accepted
    pub fn value(&mut self, key: &'static str) -> Option<&'a ParamValue> {
        self.consumed.insert(key);
        self.params.get(key)
    }

    pub fn usize(&mut self, key: &'static str, default: usize) -> Result<usize> {
        Ok(self.opt_usize(key, Some(default))?.unwrap_or(default))
    }

    /// Non-negative integer, `None` allowed
    pub fn opt_usize(&mut self, key: &'static str, default: Option<usize>) -> Result<Option<usize>> {
        match self.value(key) {
            None => Ok(default),
            Some(ParamValue::None) => Ok(None),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(Some(*v as usize)),
            Some(other) => Err(self.invalid(key, other, "expected a non-negative integer")),
        }
    }

    pub fn opt_u64(&mut self, key: &'static str) -> Result<Option<u64>> {
        Ok(self.opt_usize(key, None)?.map(|v| v as u64))
    }

    pub fn f64(&mut self, key: &'static str, default: f64) -> Result<f64> {
        match self.value(key) {
            None => Ok(default),
            Some(v) => match v.as_f64() {
                Some(f) => Ok(f),
                None => Err(self.invalid(key, v, "expected a number")),
            },
        }
    }

    /// Number strictly greater than zero
    pub fn positive_f64(&mut self, key: &'static str, default: f64) -> Result<f64> {
        let value = self.f64(key, default)?;
        if value > 0.0 && value.is_finite() {
            Ok(value)
        } else {
            Err(ClassifierError::invalid_parameter(
                key,
                value,
                format!("must be a positive number for {}", self.family),
            ))
        }
    }

    pub fn bool(&mut self, key: &'static str, default: bool) -> Result<bool> {
        match self.value(key) {
            None => Ok(default),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(other) => Err(self.invalid(key, other, "expected a boolean")),
        }
    }

    /// One of a fixed set of string options
    pub fn choice(&mut self, key: &'static str, default: &'static str, allowed: &[&'static str]) -> Result<&'static str> {
        match self.value(key) {
            None => Ok(default),
            Some(ParamValue::Str(s)) => allowed
                .iter()
                .copied()
                .find(|option| *option == s.as_str())
                .ok_or_else(|| {
                    self.invalid(
                        key,
                        &ParamValue::Str(s.clone()),
                        &format!("expected one of {}", allowed.join(", ")),
                    )
                }),
            Some(other) => Err(self.invalid(key, other, "expected a string")),
        }
    }

    /// Fails on the first key that was never read
    pub fn finish(self) -> Result<()> {
        for (key, value) in self.params.iter() {
            if !self.consumed.contains(key.as_str()) {
                return Err(ClassifierError::invalid_parameter(
                    key.clone(),
                    value,
                    format!("not a parameter of {}", self.family),
                ));
            }
        }
        Ok(())
    }

    pub fn invalid(&self, key: &str, value: &ParamValue, reason: &str) -> ClassifierError {
        ClassifierError::invalid_parameter(key, value, format!("{} ({})", reason, self.family))
    }
}
