//! Helper functions available to component markup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

/// A helper callable from markup. Errors are plain messages; the caller
/// attaches the function name.
pub type Func = Arc<dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync>;

pub type FuncMap = HashMap<String, Func>;

/// Names resolved by the render session itself. Custom helpers cannot
/// replace them.
pub const RESERVED_NAMES: &[&str] = &["comp", "param", "paramOr", "dict"];

pub fn func<F>(f: F) -> Func
where
    F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn default_funcs() -> FuncMap {
    let mut funcs = FuncMap::new();
    funcs.insert("add".into(), func(|args| arith(args, i64::checked_add)));
    funcs.insert("sub".into(), func(|args| arith(args, i64::checked_sub)));
    funcs.insert("mul".into(), func(|args| arith(args, i64::checked_mul)));
    funcs.insert(
        "mod".into(),
        func(|args| {
            let (a, b) = two_ints(args)?;
            if b == 0 {
                return Err("integer divide by zero".to_string());
            }
            Ok(Value::Int(a % b))
        }),
    );
    funcs.insert(
        "toJson".into(),
        func(|args| Ok(Value::Str(args.first().map(Value::to_json).unwrap_or_else(|| "{}".into())))),
    );
    funcs.insert(
        "hasField".into(),
        func(|args| match args {
            [Value::Map(map), key] => Ok(Value::Bool(
                map.get(&key.to_text()).is_some_and(Value::is_truthy),
            )),
            [_, _] => Ok(Value::Bool(false)),
            _ => Err(format!("wrong number of args: want 2, got {}", args.len())),
        }),
    );
    funcs
}

fn two_ints(args: &[Value]) -> std::result::Result<(i64, i64), String> {
    match args {
        [a, b] => {
            let a = a.as_i64().ok_or_else(|| format!("expected integer, got {:?}", a))?;
            let b = b.as_i64().ok_or_else(|| format!("expected integer, got {:?}", b))?;
            Ok((a, b))
        }
        _ => Err(format!("wrong number of args: want 2, got {}", args.len())),
    }
}

fn arith(args: &[Value], op: fn(i64, i64) -> Option<i64>) -> std::result::Result<Value, String> {
    let (a, b) = two_ints(args)?;
    op(a, b).map(Value::Int).ok_or_else(|| "integer overflow".to_string())
}

/// Build a map from alternating key/value arguments.
pub fn dict(args: &[Value]) -> Result<Value> {
    if args.len() % 2 != 0 {
        return Err(Error::Dict("odd number of arguments".to_string()));
    }
    let mut entries = Vec::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| Error::Dict(format!("keys must be strings, got {:?}", pair[0])))?;
        entries.push((key.to_string(), pair[1].clone()));
    }
    Ok(Value::map(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> std::result::Result<Value, String> {
        let funcs = default_funcs();
        (funcs[name])(args)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(call("add", &[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        assert_eq!(call("sub", &[Value::Int(2), Value::Int(3)]), Ok(Value::Int(-1)));
        assert_eq!(call("mul", &[Value::Int(4), Value::Float(2.0)]), Ok(Value::Int(8)));
        assert_eq!(call("mod", &[Value::Int(7), Value::Int(3)]), Ok(Value::Int(1)));
    }

    #[test]
    fn test_mod_by_zero_fails() {
        assert!(call("mod", &[Value::Int(7), Value::Int(0)]).is_err());
    }

    #[test]
    fn test_to_json() {
        let v = Value::map([("a", Value::Int(1))]);
        assert_eq!(call("toJson", &[v]), Ok(Value::Str(r#"{"a":1}"#.into())));
        assert_eq!(call("toJson", &[]), Ok(Value::Str("{}".into())));
    }

    #[test]
    fn test_has_field() {
        let v = Value::map([("a", Value::Int(3)), ("z", Value::Int(0))]);
        assert_eq!(call("hasField", &[v.clone(), "a".into()]), Ok(Value::Bool(true)));
        assert_eq!(call("hasField", &[v.clone(), "z".into()]), Ok(Value::Bool(false)));
        assert_eq!(call("hasField", &[v, "b".into()]), Ok(Value::Bool(false)));
        assert_eq!(call("hasField", &[Value::Int(1), "a".into()]), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_dict() {
        let v = dict(&["a".into(), Value::Int(1), "b".into(), "x".into()]).unwrap();
        assert_eq!(v.get("a"), Some(&Value::Int(1)));
        assert_eq!(v.get("b"), Some(&Value::Str("x".into())));
        assert_eq!(dict(&[]).unwrap(), Value::Map(Default::default()));
    }

    #[test]
    fn test_dict_errors() {
        assert!(matches!(dict(&["a".into()]), Err(Error::Dict(_))));
        assert!(matches!(dict(&[Value::Int(1), Value::Int(2)]), Err(Error::Dict(_))));
    }
}
