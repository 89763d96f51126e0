//! Universal operator registry.
//!
//! These are the only SQL shapes the planner may emit. Every WHERE fragment
//! in the crate is produced by [`Operator::clause`]; nothing else builds SQL
//! condition text. New operators require touching this enum, the clause
//! template, and the column capability registry together.

use serde::{Deserialize, Serialize};

/// Execution phase of an operator. Waves run in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Wave {
    Exact = 0,
    Ilike = 1,
    Trigram = 2,
    Vector = 3,
}

impl Wave {
    pub fn as_index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Wave::Exact => "EXACT",
            Wave::Ilike => "ILIKE",
            Wave::Trigram => "TRIGRAM",
            Wave::Vector => "VECTOR",
        }
    }
}

/// The complete operator set. No others allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Exact,
    Ilike,
    Trigram,
    In,
    Range,
    ArrayAnyIlike,
    JsonbPathIlike,
    Vector,
}

impl Operator {
    /// Wave this operator executes in.
    pub fn wave(self) -> Wave {
        match self {
            Operator::Exact | Operator::In | Operator::Range => Wave::Exact,
            Operator::Ilike | Operator::ArrayAnyIlike | Operator::JsonbPathIlike => Wave::Ilike,
            Operator::Trigram => Wave::Trigram,
            Operator::Vector => Wave::Vector,
        }
    }

    /// Number of positional parameters the clause template consumes.
    /// RANGE is the only two-parameter operator.
    pub fn param_count(self) -> usize {
        match self {
            Operator::Range => 2,
            _ => 1,
        }
    }

    /// Render the parameterized clause fragment for `column` starting at
    /// positional parameter `param`. `json_key` comes from the column
    /// capability registry, never from caller input.
    pub fn clause(
        self,
        column: &str,
        param: usize,
        json_key: Option<&str>,
        tuning: &OperatorTuning,
    ) -> String {
        match self {
            Operator::Exact => format!("{column} = ${param}"),
            Operator::Ilike => format!("{column} ILIKE ${param}"),
            Operator::Trigram => {
                format!("similarity({column}, ${param}) >= {}", tuning.trigram_threshold)
            },
            Operator::In => format!("{column} = ANY(${param})"),
            Operator::Range => format!("{column} BETWEEN ${param} AND ${}", param + 1),
            Operator::ArrayAnyIlike => {
                format!("EXISTS (SELECT 1 FROM unnest({column}) AS _elem WHERE _elem ILIKE ${param})")
            },
            Operator::JsonbPathIlike => {
                let key = json_key.unwrap_or("value");
                format!("{column} ->> '{key}' ILIKE ${param}")
            },
            Operator::Vector => {
                format!("(1 - ({column} <=> ${param})) >= {}", tuning.vector_threshold)
            },
        }
    }
}

/// Numeric knobs referenced by clause templates. Frozen at process start
/// together with the rest of the registries.
#[derive(Debug, Clone, Copy)]
pub struct OperatorTuning {
    pub trigram_threshold: f64,
    pub vector_threshold: f64,
}

impl Default for OperatorTuning {
    fn default() -> Self {
        Self { trigram_threshold: 0.3, vector_threshold: 0.70 }
    }
}

/// A bound parameter value. Probes carry these; the database collaborator
/// binds them positionally. Caller text never reaches SQL any other way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Uuid(uuid::Uuid),
    Int(i64),
    Float(f64),
    TextArray(Vec<String>),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waves_are_ordered() {
        assert!(Wave::Exact < Wave::Ilike);
        assert!(Wave::Ilike < Wave::Trigram);
        assert!(Wave::Trigram < Wave::Vector);
    }

    #[test]
    fn range_is_the_only_two_param_operator() {
        for op in [
            Operator::Exact,
            Operator::Ilike,
            Operator::Trigram,
            Operator::In,
            Operator::ArrayAnyIlike,
            Operator::JsonbPathIlike,
            Operator::Vector,
        ] {
            assert_eq!(op.param_count(), 1, "{op:?}");
        }
        assert_eq!(Operator::Range.param_count(), 2);
    }

    #[test]
    fn clause_templates_reference_declared_params() {
        let tuning = OperatorTuning::default();
        assert_eq!(Operator::Exact.clause("part_number", 2, None, &tuning), "part_number = $2");
        assert_eq!(Operator::Ilike.clause("name", 3, None, &tuning), "name ILIKE $3");
        assert_eq!(
            Operator::Trigram.clause("name", 4, None, &tuning),
            "similarity(name, $4) >= 0.3"
        );
        assert_eq!(
            Operator::Range.clause("quantity", 2, None, &tuning),
            "quantity BETWEEN $2 AND $3"
        );
        assert_eq!(
            Operator::JsonbPathIlike.clause("attributes", 2, Some("model"), &tuning),
            "attributes ->> 'model' ILIKE $2"
        );
    }
}
