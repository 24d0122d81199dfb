use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use crate::errors::Result;

/// Trait for pluggable functions callable from template expressions.
///
/// Method-style calls (`recv.name(a)`) pass the receiver as the first argument.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> std::ops::RangeInclusive<usize>;
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtins::Upper);
        registry.register(builtins::Lower);
        registry.register(builtins::Trim);
        registry.register(builtins::Len);
        registry.register(builtins::Join);
        registry.register(builtins::Includes);
        registry.register(builtins::Round);
        registry.register(builtins::Floor);
        registry.register(builtins::Ceil);
        registry.register(builtins::Abs);
        registry.register(builtins::Min);
        registry.register(builtins::Max);
        registry.register(builtins::ToFixed);
        registry.register(builtins::StringFn);
        registry.register(builtins::NumberFn);
        registry.register(builtins::Json);
        registry.register(builtins::First);
        registry.register(builtins::Unique);
        registry.register(builtins::OrDefault);
        registry.alias("toUpperCase", "upper");
        registry.alias("toLowerCase", "lower");
        registry
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    /// Expose an existing function under a second name.
    pub fn alias(&mut self, alias: &'static str, target: &str) {
        if let Some(f) = self.get(target) {
            Arc::make_mut(&mut self.inner).insert(alias, f);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}

pub mod builtins {
    use super::*;
    use crate::errors::EvalError;
    use crate::value::{number_value, to_display_string, to_number};
    use itertools::Itertools;
    use serde_json::Value;

    fn arg(args: &[Value], i: usize) -> &Value {
        args.get(i).unwrap_or(&Value::Null)
    }

    fn text(args: &[Value], i: usize) -> String {
        to_display_string(args.get(i))
    }

    fn math(args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value> {
        number_value(f(to_number(args.first())))
    }

    pub struct Upper;
    impl Function for Upper {
        fn name(&self) -> &'static str { "upper" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(text(args, 0).to_uppercase()))
        }
    }

    pub struct Lower;
    impl Function for Lower {
        fn name(&self) -> &'static str { "lower" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(text(args, 0).to_lowercase()))
        }
    }

    pub struct Trim;
    impl Function for Trim {
        fn name(&self) -> &'static str { "trim" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(text(args, 0).trim().to_string()))
        }
    }

    pub struct Len;
    impl Function for Len {
        fn name(&self) -> &'static str { "len" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let len = match arg(args, 0) {
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                Value::String(s) => s.chars().count(),
                _ => 0,
            };
            Ok(Value::from(len))
        }
    }

    pub struct Join;
    impl Function for Join {
        fn name(&self) -> &'static str { "join" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let sep = match args.get(1) {
                Some(v) => to_display_string(Some(v)),
                None => ",".to_string(),
            };
            match arg(args, 0) {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(|v| to_display_string(Some(v))).join(&sep),
                )),
                other => Err(EvalError::Type(format!(
                    "join expects an array, got {}",
                    crate::value::type_of(Some(other))
                ))),
            }
        }
    }

    pub struct Includes;
    impl Function for Includes {
        fn name(&self) -> &'static str { "includes" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let found = match arg(args, 0) {
                Value::Array(items) => items
                    .iter()
                    .any(|v| crate::comparison::strict_eq(Some(v), args.get(1))),
                Value::String(s) => s.contains(text(args, 1).as_str()),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
    }

    pub struct Round;
    impl Function for Round {
        fn name(&self) -> &'static str { "round" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            // Math.round rounds halves towards +infinity.
            math(args, |f| (f + 0.5).floor())
        }
    }

    pub struct Floor;
    impl Function for Floor {
        fn name(&self) -> &'static str { "floor" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            math(args, f64::floor)
        }
    }

    pub struct Ceil;
    impl Function for Ceil {
        fn name(&self) -> &'static str { "ceil" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            math(args, f64::ceil)
        }
    }

    pub struct Abs;
    impl Function for Abs {
        fn name(&self) -> &'static str { "abs" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            math(args, f64::abs)
        }
    }

    pub struct Min;
    impl Function for Min {
        fn name(&self) -> &'static str { "min" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=usize::MAX }
        fn call(&self, args: &[Value]) -> Result<Value> {
            number_value(args.iter().map(|v| to_number(Some(v))).fold(f64::INFINITY, f64::min))
        }
    }

    pub struct Max;
    impl Function for Max {
        fn name(&self) -> &'static str { "max" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=usize::MAX }
        fn call(&self, args: &[Value]) -> Result<Value> {
            number_value(args.iter().map(|v| to_number(Some(v))).fold(f64::NEG_INFINITY, f64::max))
        }
    }

    pub struct ToFixed;
    impl Function for ToFixed {
        fn name(&self) -> &'static str { "toFixed" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let n = to_number(args.first());
            if !n.is_finite() {
                return Err(EvalError::Runtime("toFixed on a non-finite number".into()));
            }
            let digits = args.get(1).map(|v| to_number(Some(v))).unwrap_or(0.0);
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvalError::Runtime("toFixed() digits argument must be between 0 and 100".into()));
            }
            Ok(Value::String(format!("{:.*}", digits as usize, n)))
        }
    }

    pub struct StringFn;
    impl Function for StringFn {
        fn name(&self) -> &'static str { "String" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(text(args, 0)))
        }
    }

    pub struct NumberFn;
    impl Function for NumberFn {
        fn name(&self) -> &'static str { "Number" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            number_value(to_number(args.first()))
        }
    }

    pub struct Json;
    impl Function for Json {
        fn name(&self) -> &'static str { "json" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            serde_json::to_string(arg(args, 0))
                .map(Value::String)
                .map_err(|e| EvalError::Runtime(e.to_string()))
        }
    }

    /// First element of an array; null otherwise.
    pub struct First;
    impl Function for First {
        fn name(&self) -> &'static str { "first" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Array(a) => a.first().cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
    }

    /// Deduplicate an array; identity for non-arrays.
    pub struct Unique;
    impl Function for Unique {
        fn name(&self) -> &'static str { "unique" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Array(a) => Value::Array(
                    a.iter()
                        .cloned()
                        .unique_by(|x| serde_json::to_string(x).unwrap_or_default())
                        .collect(),
                ),
                other => other.clone(),
            })
        }
    }

    /// `fallback` when the value is null or an empty array/string.
    pub struct OrDefault;
    impl Function for OrDefault {
        fn name(&self) -> &'static str { "or_default" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Null => arg(args, 1).clone(),
                Value::Array(a) if a.is_empty() => arg(args, 1).clone(),
                Value::String(s) if s.is_empty() => arg(args, 1).clone(),
                other => other.clone(),
            })
        }
    }
}
