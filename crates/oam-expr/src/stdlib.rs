//! The built-in package-import surface templates may call into:
//! `strings`, `encoding/json`, `encoding/base64`, `strconv`. Workflow-step
//! primitives (`apply`, `read`, ...) are *not* here — they need I/O and are
//! implemented natively by `oam-workflow` instead of being interpreted by
//! this evaluator (see crate docs).

use base64::Engine as _;

use crate::eval::EvalError;
use crate::value::Value;

pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "strings.Join"
            | "strings.Split"
            | "strings.ToUpper"
            | "strings.ToLower"
            | "strings.Trim"
            | "strings.Contains"
            | "strings.HasPrefix"
            | "strings.HasSuffix"
            | "json.Marshal"
            | "json.Unmarshal"
            | "base64.Encode"
            | "base64.Decode"
            | "strconv.ParseInt"
            | "strconv.FormatInt"
            | "strconv.ParseBool"
            | "len"
    )
}

pub fn call(name: &str, args: &[Value], path: &str) -> Result<Value, EvalError> {
    match name {
        "strings.Join" => {
            let (list, sep) = two_args(name, args, path)?;
            let items = expect_list(list, path)?;
            let sep = expect_str(sep, path)?;
            let joined = items
                .iter()
                .map(render_scalar)
                .collect::<Result<Vec<_>, _>>()?
                .join(sep);
            Ok(Value::String(joined))
        }
        "strings.Split" => {
            let (s, sep) = two_args(name, args, path)?;
            let s = expect_str(s, path)?;
            let sep = expect_str(sep, path)?;
            Ok(Value::List(
                s.split(sep).map(|part| Value::String(part.to_owned())).collect(),
            ))
        }
        "strings.ToUpper" => Ok(Value::String(expect_str(one_arg(name, args, path)?, path)?.to_uppercase())),
        "strings.ToLower" => Ok(Value::String(expect_str(one_arg(name, args, path)?, path)?.to_lowercase())),
        "strings.Trim" => Ok(Value::String(
            expect_str(one_arg(name, args, path)?, path)?.trim().to_owned(),
        )),
        "strings.Contains" => {
            let (s, needle) = two_args(name, args, path)?;
            Ok(Value::Bool(
                expect_str(s, path)?.contains(expect_str(needle, path)?),
            ))
        }
        "strings.HasPrefix" => {
            let (s, prefix) = two_args(name, args, path)?;
            Ok(Value::Bool(
                expect_str(s, path)?.starts_with(expect_str(prefix, path)?),
            ))
        }
        "strings.HasSuffix" => {
            let (s, suffix) = two_args(name, args, path)?;
            Ok(Value::Bool(
                expect_str(s, path)?.ends_with(expect_str(suffix, path)?),
            ))
        }
        "json.Marshal" => {
            let value = one_arg(name, args, path)?;
            let json: serde_json::Value = value.clone().into();
            serde_json::to_string(&json)
                .map(Value::String)
                .map_err(|err| call_error(path, name, err.to_string()))
        }
        "json.Unmarshal" => {
            let s = expect_str(one_arg(name, args, path)?, path)?;
            let json: serde_json::Value = serde_json::from_str(s)
                .map_err(|err| call_error(path, name, err.to_string()))?;
            Ok(json.into())
        }
        "base64.Encode" => {
            let s = expect_str(one_arg(name, args, path)?, path)?;
            Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(s.as_bytes()),
            ))
        }
        "base64.Decode" => {
            let s = expect_str(one_arg(name, args, path)?, path)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|err| call_error(path, name, err.to_string()))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|err| call_error(path, name, err.to_string()))
        }
        "strconv.ParseInt" => {
            let s = expect_str(one_arg(name, args, path)?, path)?;
            s.parse::<i64>()
                .map(Value::Int)
                .map_err(|err| call_error(path, name, err.to_string()))
        }
        "strconv.FormatInt" => {
            let value = one_arg(name, args, path)?;
            match value {
                Value::Int(i) => Ok(Value::String(i.to_string())),
                other => Err(type_error(path, "int", other)),
            }
        }
        "strconv.ParseBool" => {
            let s = expect_str(one_arg(name, args, path)?, path)?;
            s.parse::<bool>()
                .map(Value::Bool)
                .map_err(|err| call_error(path, name, err.to_string()))
        }
        "len" => {
            let value = one_arg(name, args, path)?;
            match value {
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Record(fields) => Ok(Value::Int(fields.len() as i64)),
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(type_error(path, "list, record, or string", other)),
            }
        }
        other => Err(EvalError::UnknownFunction {
            path: path.to_owned(),
            name: other.to_owned(),
        }),
    }
}

fn one_arg<'a>(name: &str, args: &'a [Value], path: &str) -> Result<&'a Value, EvalError> {
    args.first().ok_or_else(|| call_error(path, name, "expected 1 argument, got 0".to_owned()))
}

fn two_args<'a>(name: &str, args: &'a [Value], path: &str) -> Result<(&'a Value, &'a Value), EvalError> {
    if args.len() < 2 {
        return Err(call_error(
            path,
            name,
            format!("expected 2 arguments, got {}", args.len()),
        ));
    }
    Ok((&args[0], &args[1]))
}

fn expect_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, EvalError> {
    value.as_str().ok_or_else(|| type_error(path, "string", value))
}

fn expect_list<'a>(value: &'a Value, path: &str) -> Result<&'a [Value], EvalError> {
    value.as_list().ok_or_else(|| type_error(path, "list", value))
}

fn render_scalar(value: &Value) -> Result<String, EvalError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(type_error("", "scalar", other)),
    }
}

fn type_error(path: &str, expected: &'static str, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        path: path.to_owned(),
        expected,
        found: found.type_name(),
    }
}

fn call_error(path: &str, name: &str, message: String) -> EvalError {
    EvalError::Call {
        path: path.to_owned(),
        message: format!("{name}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_concatenates_with_separator() {
        let args = vec![
            Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
            Value::String(",".into()),
        ];
        assert_eq!(call("strings.Join", &args, "").unwrap(), Value::String("a,b".into()));
    }

    #[test]
    fn json_round_trips_through_marshal_unmarshal() {
        let original = Value::Record(indexmap::IndexMap::from([(
            "x".to_owned(),
            Value::Int(1),
        )]));
        let marshaled = call("json.Marshal", &[original.clone()], "").unwrap();
        let unmarshaled = call("json.Unmarshal", &[marshaled], "").unwrap();
        assert_eq!(unmarshaled, original);
    }

    #[test]
    fn base64_round_trips() {
        let encoded = call("base64.Encode", &[Value::String("hello".into())], "").unwrap();
        let decoded = call("base64.Decode", &[encoded], "").unwrap();
        assert_eq!(decoded, Value::String("hello".into()));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = call("nope.Nope", &[], "output").unwrap_err();
        assert!(matches!(err, EvalError::UnknownFunction { .. }));
    }
}
