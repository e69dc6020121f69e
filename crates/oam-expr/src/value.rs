//! The runtime value type the evaluator produces and unifies, and the
//! record-unification algorithm itself: "a partially-specified
//! record plus a constraint record must unify into one or fail").

use indexmap::IndexMap;
use snafu::Snafu;

/// A fully- or partially-evaluated value.
///
/// `Value::Null` doubles as CUE-style "top/unset": it unifies with anything
/// by being replaced, the way an unset optional field does.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Record(IndexMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Truthiness used by `if` conditions and comprehension guards.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum UnifyError {
    #[snafu(display(
        "cannot unify {left_type} and {right_type} at {path}: concrete values conflict"
    ))]
    Conflict {
        path: String,
        left_type: &'static str,
        right_type: &'static str,
    },
}

/// Unifies `a` with `b`, preferring `a`'s concrete values and falling back
/// to `b` for anything `a` leaves unset. Records unify field-by-field
/// (union of keys); lists unify elementwise when of equal length, and fall
/// back wholesale to the other side if one is empty (an empty list in a
/// partial spec is "unspecified", mirroring the `Merge` treatment of `Vec`
/// in `oam-core`).
pub fn unify(path: &str, a: &Value, b: &Value) -> Result<Value, UnifyError> {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Record(ra), Value::Record(rb)) => {
            let mut out = IndexMap::new();
            for key in ra.keys().chain(rb.keys().filter(|k| !ra.contains_key(*k))) {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let merged = match (ra.get(key), rb.get(key)) {
                    (Some(va), Some(vb)) => unify(&field_path, va, vb)?,
                    (Some(va), None) => va.clone(),
                    (None, Some(vb)) => vb.clone(),
                    (None, None) => unreachable!("key came from one of the two maps"),
                };
                out.insert(key.clone(), merged);
            }
            Ok(Value::Record(out))
        }
        (Value::List(la), Value::List(lb)) => {
            if la.is_empty() {
                Ok(Value::List(lb.clone()))
            } else if lb.is_empty() {
                Ok(Value::List(la.clone()))
            } else if la.len() == lb.len() {
                let merged = la
                    .iter()
                    .zip(lb.iter())
                    .enumerate()
                    .map(|(i, (x, y))| unify(&format!("{path}[{i}]"), x, y))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(merged))
            } else {
                Err(UnifyError::Conflict {
                    path: path.to_owned(),
                    left_type: "list",
                    right_type: "list",
                })
            }
        }
        (left, right) => {
            if left == right {
                Ok(left.clone())
            } else {
                Err(UnifyError::Conflict {
                    path: path.to_owned(),
                    left_type: left.type_name(),
                    right_type: right.type_name(),
                })
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect::<serde_json::Map<_, _>>(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect::<IndexMap<_, _>>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, Value)]) -> Value {
        Value::Record(fields.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect())
    }

    #[test]
    fn unify_prefers_concrete_over_null() {
        let got = unify("", &Value::Null, &Value::Int(3)).unwrap();
        assert_eq!(got, Value::Int(3));
    }

    #[test]
    fn unify_merges_disjoint_record_keys() {
        let a = record(&[("x", Value::Int(1))]);
        let b = record(&[("y", Value::Int(2))]);
        let got = unify("", &a, &b).unwrap();
        assert_eq!(
            got,
            record(&[("x", Value::Int(1)), ("y", Value::Int(2))])
        );
    }

    #[test]
    fn unify_conflicting_scalars_fails() {
        let err = unify("spec.replicas", &Value::Int(1), &Value::Int(2)).unwrap_err();
        assert_eq!(
            err,
            UnifyError::Conflict {
                path: "spec.replicas".to_owned(),
                left_type: "int",
                right_type: "int",
            }
        );
    }

    #[test]
    fn unify_nested_records_recurses() {
        let a = record(&[("spec", record(&[("replicas", Value::Int(3))]))]);
        let b = record(&[("spec", record(&[("image", Value::String("nginx".into()))]))]);
        let got = unify("", &a, &b).unwrap();
        let expected = record(&[(
            "spec",
            record(&[
                ("replicas", Value::Int(3)),
                ("image", Value::String("nginx".into())),
            ]),
        )]);
        assert_eq!(got, expected);
    }
}
