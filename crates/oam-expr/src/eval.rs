//! Evaluates the AST against a bound `parameter`/`context`
//! environment, producing [`Value`]s. Kept free of any I/O: the `processing`
//! HTTP call and the workflow primitive library are implemented by callers
//! in terms of values this evaluator produces, not by this module.

use indexmap::IndexMap;
use snafu::{OptionExt, Snafu};

use crate::ast::{BinOp, Expr, InterpPart, Literal, RecordField, UnOp};
use crate::stdlib;
use crate::value::{UnifyError, Value, unify};

#[derive(Debug, Snafu, PartialEq)]
pub enum EvalError {
    #[snafu(display("reference to undefined name {name:?} at {path}"))]
    ReferenceNotFound { name: String, path: String },

    #[snafu(display("{path}: expected {expected}, found {found}"))]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[snafu(display("{path}: required field never resolved to a concrete value"))]
    IncompleteValue { path: String },

    #[snafu(display("{path}: {source}"))]
    Unify { path: String, source: UnifyError },

    #[snafu(display("{path}: unknown function {name:?}"))]
    UnknownFunction { path: String, name: String },

    #[snafu(display("{path}: {message}"))]
    Call { path: String, message: String },

    #[snafu(display("{path}: index {index} out of range for a {len}-element list"))]
    IndexOutOfRange { path: String, index: i64, len: usize },
}

/// The name bindings visible to a template evaluation: `parameter`,
/// `context`, and (once the `processing` block has run) `processing`, plus
/// whatever comprehension loop variables are currently in scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    fn child(&self, name: &str, value: Value) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.insert(name.to_owned(), value);
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Evaluates a top-level record body (the `output`, `outputs.<key>`, `patch`,
/// `healthPolicy`, ... blocks) into a single [`Value::Record`].
pub fn eval_record(fields: &[RecordField], scope: &Scope, path: &str) -> Result<Value, EvalError> {
    let mut out = IndexMap::new();
    eval_fields_into(fields, scope, path, &mut out)?;
    Ok(Value::Record(out))
}

fn eval_fields_into(
    fields: &[RecordField],
    scope: &Scope,
    path: &str,
    out: &mut IndexMap<String, Value>,
) -> Result<(), EvalError> {
    for field in fields {
        match field {
            RecordField::Required { name, value } => {
                let field_path = join_path(path, name);
                let evaluated = eval_expr(value, scope, &field_path)?;
                out.insert(name.clone(), evaluated);
            }
            RecordField::Optional { name, value } => {
                let field_path = join_path(path, name);
                let evaluated = eval_expr(value, scope, &field_path)?;
                if evaluated != Value::Null {
                    out.insert(name.clone(), evaluated);
                }
            }
            RecordField::Conditional { cond, fields } => {
                let cond_path = join_path(path, "if");
                let cond_value = eval_expr(cond, scope, &cond_path)?;
                if cond_value.is_truthy() {
                    eval_fields_into(fields, scope, path, out)?;
                }
            }
            RecordField::Comprehension {
                key,
                value,
                source,
                fields,
            } => {
                let source_path = join_path(path, "for");
                let source_value = eval_expr(source, scope, &source_path)?;
                match &source_value {
                    Value::List(items) => {
                        for (index, item) in items.iter().enumerate() {
                            let mut child = scope.clone();
                            if let Some(key_name) = key {
                                child = child.child(key_name, Value::Int(index as i64));
                            }
                            child = child.child(value, item.clone());
                            eval_fields_into(fields, &child, path, out)?;
                        }
                    }
                    Value::Record(map) => {
                        for (map_key, item) in map {
                            let mut child = scope.clone();
                            if let Some(key_name) = key {
                                child = child.child(key_name, Value::String(map_key.clone()));
                            }
                            child = child.child(value, item.clone());
                            eval_fields_into(fields, &child, path, out)?;
                        }
                    }
                    other => {
                        return Err(EvalError::TypeMismatch {
                            path: source_path,
                            expected: "list or record",
                            found: other.type_name(),
                        });
                    }
                }
            }
            RecordField::Embed(expr) => {
                let embed_path = join_path(path, "...");
                let value = eval_expr(expr, scope, &embed_path)?;
                match value {
                    Value::Record(map) => {
                        for (k, v) in map {
                            out.insert(k, v);
                        }
                    }
                    Value::Null => {}
                    other => {
                        return Err(EvalError::TypeMismatch {
                            path: embed_path,
                            expected: "record",
                            found: other.type_name(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_owned()
    } else {
        format!("{path}.{segment}")
    }
}

pub fn eval_expr(expr: &Expr, scope: &Scope, path: &str) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(literal) => Ok(literal_value(literal)),
        Expr::Ident(name) => lookup_dotted(name, scope, path),
        Expr::Interpolation(parts) => eval_interpolation(parts, scope, path),
        Expr::Selector(base, field) => {
            let base_value = eval_expr(base, scope, path)?;
            select_field(&base_value, field, &join_path(path, field))
        }
        Expr::Index(base, index) => {
            let base_value = eval_expr(base, scope, path)?;
            let index_value = eval_expr(index, scope, path)?;
            index_into(&base_value, &index_value, path)
        }
        Expr::Slice(base, start, end) => {
            let base_value = eval_expr(base, scope, path)?;
            let start = start
                .as_ref()
                .map(|e| eval_expr(e, scope, path))
                .transpose()?;
            let end = end.as_ref().map(|e| eval_expr(e, scope, path)).transpose()?;
            slice_value(&base_value, start.as_ref(), end.as_ref(), path)
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, scope, path),
        Expr::Unary(op, operand) => {
            let value = eval_expr(operand, scope, path)?;
            match op {
                UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnOp::Neg => match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(EvalError::TypeMismatch {
                        path: path.to_owned(),
                        expected: "number",
                        found: other.type_name(),
                    }),
                },
            }
        }
        Expr::Call(callee, args) => eval_call(callee, args, scope, path),
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| eval_expr(item, scope, path))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }
        Expr::Record(fields) => eval_record(fields, scope, path),
        Expr::Default(first, fallback) => match eval_expr(first, scope, path) {
            Ok(Value::Null) => eval_expr(fallback, scope, path),
            Ok(value) => Ok(value),
            Err(_) => eval_expr(fallback, scope, path),
        },
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn eval_interpolation(parts: &[InterpPart], scope: &Scope, path: &str) -> Result<Value, EvalError> {
    let mut buf = String::new();
    for part in parts {
        match part {
            InterpPart::Text(text) => buf.push_str(text),
            InterpPart::Expr(expr) => {
                let value = eval_expr(expr, scope, path)?;
                buf.push_str(&display_value(&value));
            }
        }
    }
    Ok(Value::String(buf))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::Value::from(other.clone()).to_string(),
    }
}

/// Resolves a (possibly dotted) identifier such as `parameter.image` or
/// `context.output.metadata.name` against the bound top-level names.
fn lookup_dotted(name: &str, scope: &Scope, path: &str) -> Result<Value, EvalError> {
    let mut parts = name.split('.');
    let head = parts.next().expect("split always yields at least one part");
    let mut current = scope
        .get(head)
        .cloned()
        .context(ReferenceNotFoundSnafu {
            name: head.to_owned(),
            path: path.to_owned(),
        })?;
    let mut current_path = head.to_owned();
    for part in parts {
        current_path = join_path(&current_path, part);
        current = select_field(&current, part, &current_path)?;
    }
    Ok(current)
}

fn select_field(value: &Value, field: &str, path: &str) -> Result<Value, EvalError> {
    match value {
        Value::Record(map) => map.get(field).cloned().context(ReferenceNotFoundSnafu {
            name: field.to_owned(),
            path: path.to_owned(),
        }),
        Value::Null => Ok(Value::Null),
        other => Err(EvalError::TypeMismatch {
            path: path.to_owned(),
            expected: "record",
            found: other.type_name(),
        }),
    }
}

fn index_into(base: &Value, index: &Value, path: &str) -> Result<Value, EvalError> {
    match (base, index) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(*i, items.len());
            items
                .get(idx)
                .cloned()
                .ok_or(EvalError::IndexOutOfRange {
                    path: path.to_owned(),
                    index: *i,
                    len: items.len(),
                })
        }
        (Value::Record(_), Value::String(key)) => select_field(base, key, path),
        (other, _) => Err(EvalError::TypeMismatch {
            path: path.to_owned(),
            expected: "list or record",
            found: other.type_name(),
        }),
    }
}

fn normalize_index(i: i64, len: usize) -> usize {
    if i < 0 {
        (len as i64 + i).max(0) as usize
    } else {
        i as usize
    }
}

fn slice_value(
    base: &Value,
    start: Option<&Value>,
    end: Option<&Value>,
    path: &str,
) -> Result<Value, EvalError> {
    let to_index = |v: Option<&Value>, default: usize, len: usize| -> Result<usize, EvalError> {
        match v {
            None => Ok(default),
            Some(Value::Int(i)) => Ok(normalize_index(*i, len).min(len)),
            Some(other) => Err(EvalError::TypeMismatch {
                path: path.to_owned(),
                expected: "int",
                found: other.type_name(),
            }),
        }
    };
    match base {
        Value::List(items) => {
            let start_idx = to_index(start, 0, items.len())?;
            let end_idx = to_index(end, items.len(), items.len())?;
            Ok(Value::List(items[start_idx.min(end_idx)..end_idx].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let start_idx = to_index(start, 0, chars.len())?;
            let end_idx = to_index(end, chars.len(), chars.len())?;
            Ok(Value::String(
                chars[start_idx.min(end_idx)..end_idx].iter().collect(),
            ))
        }
        other => Err(EvalError::TypeMismatch {
            path: path.to_owned(),
            expected: "list or string",
            found: other.type_name(),
        }),
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &Scope,
    path: &str,
) -> Result<Value, EvalError> {
    if matches!(op, BinOp::And) {
        let left = eval_expr(lhs, scope, path)?;
        if !left.is_truthy() {
            return Ok(Value::Bool(false));
        }
        let right = eval_expr(rhs, scope, path)?;
        return Ok(Value::Bool(right.is_truthy()));
    }
    if matches!(op, BinOp::Or) {
        let left = eval_expr(lhs, scope, path)?;
        if left.is_truthy() {
            return Ok(Value::Bool(true));
        }
        let right = eval_expr(rhs, scope, path)?;
        return Ok(Value::Bool(right.is_truthy()));
    }

    let left = eval_expr(lhs, scope, path)?;
    let right = eval_expr(rhs, scope, path)?;

    match op {
        BinOp::Add => add_values(&left, &right, path),
        BinOp::Sub => numeric_op(&left, &right, path, |a, b| a - b, |a, b| a - b),
        BinOp::Mul => numeric_op(&left, &right, path, |a, b| a * b, |a, b| a * b),
        BinOp::Div => numeric_op(&left, &right, path, |a, b| a / b, |a, b| a / b),
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::Lt => compare(&left, &right, path, |o| o == std::cmp::Ordering::Less),
        BinOp::Le => compare(&left, &right, path, |o| o != std::cmp::Ordering::Greater),
        BinOp::Gt => compare(&left, &right, path, |o| o == std::cmp::Ordering::Greater),
        BinOp::Ge => compare(&left, &right, path, |o| o != std::cmp::Ordering::Less),
        BinOp::And | BinOp::Or => unreachable!("handled above with short-circuiting"),
    }
}

fn add_values(left: &Value, right: &Value, path: &str) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => numeric_op(left, right, path, |a, b| a + b, |a, b| a + b),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    path: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (other, _) => Err(EvalError::TypeMismatch {
            path: path.to_owned(),
            expected: "number",
            found: other.type_name(),
        }),
    }
}

fn compare(
    left: &Value,
    right: &Value,
    path: &str,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        }
        (Value::Int(a), Value::Float(b)) => {
            (*a as f64).partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        }
        (Value::Float(a), Value::Int(b)) => {
            a.partial_cmp(&(*b as f64)).unwrap_or(std::cmp::Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (other, _) => {
            return Err(EvalError::TypeMismatch {
                path: path.to_owned(),
                expected: "comparable (number or string)",
                found: other.type_name(),
            });
        }
    };
    Ok(Value::Bool(accept(ordering)))
}

fn eval_call(callee: &Expr, args: &[Expr], scope: &Scope, path: &str) -> Result<Value, EvalError> {
    let Expr::Ident(name) = callee else {
        return Err(EvalError::Call {
            path: path.to_owned(),
            message: "only package-qualified function names may be called".to_owned(),
        });
    };
    let values = args
        .iter()
        .map(|arg| eval_expr(arg, scope, path))
        .collect::<Result<Vec<_>, _>>()?;
    stdlib::call(name, &values, path)
}

/// Unifies a user-supplied value (e.g. Application component `properties`)
/// against a template's declared defaults, reporting the conflicting JSON
/// path on failure — this is the parameter-binding step of the rendering pipeline.
pub fn unify_at(path: &str, user: &Value, defaults: &Value) -> Result<Value, EvalError> {
    unify(path, user, defaults).map_err(|source| EvalError::Unify {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::expr;

    fn eval_str(src: &str, scope: &Scope) -> Value {
        let (rest, parsed) = expr(src).unwrap();
        assert!(rest.trim().is_empty(), "leftover input: {rest:?}");
        eval_expr(&parsed, scope, "").unwrap()
    }

    #[test]
    fn resolves_dotted_parameter_reference() {
        let scope = Scope::new().bind(
            "parameter",
            Value::Record(IndexMap::from([("image".to_owned(), Value::String("nginx".into()))])),
        );
        assert_eq!(eval_str("parameter.image", &scope), Value::String("nginx".into()));
    }

    #[test]
    fn missing_reference_is_an_error() {
        let scope = Scope::new();
        let (rest, parsed) = expr("parameter.image").unwrap();
        assert!(rest.is_empty());
        let err = eval_expr(&parsed, &scope, "output.image").unwrap_err();
        assert!(matches!(err, EvalError::ReferenceNotFound { .. }));
    }

    #[test]
    fn default_operator_falls_back_on_null() {
        let scope = Scope::new().bind(
            "parameter",
            Value::Record(IndexMap::from([("replicas".to_owned(), Value::Null)])),
        );
        assert_eq!(eval_str("parameter.replicas | 3", &scope), Value::Int(3));
    }

    #[test]
    fn default_operator_falls_back_on_missing_reference() {
        let scope = Scope::new().bind("parameter", Value::Record(IndexMap::new()));
        assert_eq!(eval_str("parameter.replicas | 1", &scope), Value::Int(1));
    }

    #[test]
    fn string_interpolation_renders_embedded_expr() {
        let scope = Scope::new()
            .bind("context", Value::Record(IndexMap::from([("name".to_owned(), Value::String("frontend".into()))])));
        assert_eq!(
            eval_str(r#""svc-\(context.name)""#, &scope),
            Value::String("svc-frontend".into())
        );
    }

    #[test]
    fn comprehension_builds_record_from_map() {
        let fields = crate::parser::parse_template(
            r#"output: { for k, v in parameter.env { "\(k)": v } }"#,
        )
        .unwrap();
        let RecordField::Required { value, .. } = &fields[0] else {
            panic!()
        };
        let Expr::Record(inner) = value else { panic!() };
        let scope = Scope::new().bind(
            "parameter",
            Value::Record(IndexMap::from([(
                "env".to_owned(),
                Value::Record(IndexMap::from([("FOO".to_owned(), Value::String("bar".into()))])),
            )])),
        );
        let rendered = eval_record(inner, &scope, "output").unwrap();
        let record = rendered.as_record().unwrap();
        assert_eq!(record.get("FOO"), Some(&Value::String("bar".into())));
    }

    #[test]
    fn conditional_field_only_appears_when_true() {
        let fields = crate::parser::parse_template(
            r#"output: { if parameter.exposed { expose: true } }"#,
        )
        .unwrap();
        let RecordField::Required { value, .. } = &fields[0] else {
            panic!()
        };
        let Expr::Record(inner) = value else { panic!() };

        let scope_true = Scope::new().bind(
            "parameter",
            Value::Record(IndexMap::from([("exposed".to_owned(), Value::Bool(true))])),
        );
        let rendered = eval_record(inner, &scope_true, "output").unwrap();
        assert!(rendered.as_record().unwrap().contains_key("expose"));

        let scope_false = Scope::new().bind(
            "parameter",
            Value::Record(IndexMap::from([("exposed".to_owned(), Value::Bool(false))])),
        );
        let rendered = eval_record(inner, &scope_false, "output").unwrap();
        assert!(!rendered.as_record().unwrap().contains_key("expose"));
    }

    #[test]
    fn builtin_strings_join_is_callable() {
        let scope = Scope::new();
        assert_eq!(
            eval_str(r#"strings.Join(["a", "b"], ",")"#, &scope),
            Value::String("a,b".into())
        );
    }
}
