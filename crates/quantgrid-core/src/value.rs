//! Value and target specifications — the canonical identity of computed data.
//!
//! A `ValueSpecification` names one computed output: the target it was
//! evaluated against, the value name, and the properties (including the
//! producing function). Equality is structural and canonical: properties are
//! held in sorted maps so two specifications built in different orders
//! compare and hash identically. This is what the identifier directory and
//! the cache key on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ── Target specification ─────────────────────────────────────────────────────

/// The kind of entity a function is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Portfolio,
    PortfolioNode,
    Position,
    Trade,
    Security,
    Currency,
    Primitive,
}

/// Identifies one computation target: a security, position, portfolio node...
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetSpecification {
    pub target_type: TargetType,
    /// Scheme-qualified unique id, e.g. "Sec~US912828XG32".
    pub unique_id: String,
}

impl TargetSpecification {
    pub fn new(target_type: TargetType, unique_id: impl Into<String>) -> Self {
        Self {
            target_type,
            unique_id: unique_id.into(),
        }
    }
}

impl fmt::Display for TargetSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.target_type, self.unique_id)
    }
}

// ── Value properties ──────────────────────────────────────────────────────────

/// The property name carrying the producing function's identifier.
pub const FUNCTION_PROPERTY: &str = "Function";

/// Canonical property map: property name → sorted set of values.
///
/// Sorted containers keep equality, ordering, and hashing independent of
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueProperties {
    properties: BTreeMap<String, BTreeSet<String>>,
}

impl ValueProperties {
    pub fn none() -> Self {
        Self::default()
    }

    /// Properties with only the producing function set.
    pub fn with_function(function_id: impl Into<String>) -> Self {
        Self::none().with(FUNCTION_PROPERTY, function_id)
    }

    /// Add one value under a property name, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .entry(name.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// All values under a property name, if any.
    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.properties.get(name)
    }

    /// The single value under a property name. None if absent or multi-valued.
    pub fn get_single(&self, name: &str) -> Option<&str> {
        let values = self.properties.get(name)?;
        if values.len() == 1 {
            values.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// The producing function identifier, if set.
    pub fn function(&self) -> Option<&str> {
        self.get_single(FUNCTION_PROPERTY)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

// ── Value specification ───────────────────────────────────────────────────────

/// Well-known value names produced by the function library.
pub mod value_names {
    pub const PRESENT_VALUE: &str = "Present Value";
    pub const FAIR_VALUE: &str = "Fair Value";
    pub const PV01: &str = "PV01";
    pub const VALUE_DELTA: &str = "Value Delta";
    pub const VALUE_VEGA: &str = "Value Vega";
    pub const YIELD_CURVE: &str = "Yield Curve";
    pub const MARKET_VALUE: &str = "Market Value";
}

/// The canonical identity of one computed value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueSpecification {
    pub value_name: String,
    pub target: TargetSpecification,
    pub properties: ValueProperties,
}

impl ValueSpecification {
    pub fn new(
        value_name: impl Into<String>,
        target: TargetSpecification,
        properties: ValueProperties,
    ) -> Self {
        Self {
            value_name: value_name.into(),
            target,
            properties,
        }
    }
}

impl fmt::Display for ValueSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.properties.function() {
            Some(function) => write!(f, "{} on {} by {}", self.value_name, self.target, function),
            None => write!(f, "{} on {}", self.value_name, self.target),
        }
    }
}

// ── Computed value ────────────────────────────────────────────────────────────

/// One computed value: its specification plus the opaque payload produced by
/// the function library. The engine never inspects the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedValue {
    pub specification: Arc<ValueSpecification>,
    pub value: serde_json::Value,
}

impl ComputedValue {
    pub fn new(specification: Arc<ValueSpecification>, value: serde_json::Value) -> Self {
        Self {
            specification,
            value,
        }
    }
}

/// Marker written into the cache in place of an output a failed item could
/// not produce. Downstream items in the same job see a definite "not
/// computable" rather than an absent slot. Markers are never handed to
/// function code as real inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingOutput {
    /// The producing item was short of inputs.
    MissingInputs,
    /// The producing function failed.
    EvaluationError,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
