use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tse::evaluator::BuiltinEvaluator;
use tse::functions::{builtins, Function, Registry};
use tse::{Document, Engine, EvalError};

fn ctx(v: Value) -> Map<String, Value> {
    serde_json::from_value(v).unwrap()
}

fn eval(expr: &str) -> Option<Value> {
    tse::eval(expr, &Map::new()).unwrap()
}

#[test]
fn test_builtin_first() {
    assert_eq!(builtins::First.call(&[json!([10, 20])]).unwrap(), json!(10));
    assert_eq!(eval("first([])"), Some(json!(null)));
}

#[test]
fn test_builtin_unique() {
    assert_eq!(eval("unique([1, 1, 2, 2, 3])"), Some(json!([1, 2, 3])));
}

#[test]
fn test_builtin_or_default() {
    let c = ctx(json!({"empty": "", "none": null, "name": "Ann"}));
    assert_eq!(tse::render("${or_default(empty, 'n/a')}", &c), "n/a");
    assert_eq!(tse::render("${or_default(none, 'n/a')}", &c), "n/a");
    assert_eq!(tse::render("${or_default(name, 'n/a')}", &c), "Ann");
}

// Property: unique is idempotent (already single assertion)
#[test]
fn unique_idempotent_smoke() {
    let once = eval("unique([1, 1, 2, 3, 3])").unwrap();
    let twice = builtins::Unique.call(&[once.clone()]).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn string_methods_take_the_receiver_first() {
    let c = ctx(json!({"user": {"name": "  Ann  "}}));
    assert_eq!(tse::render("${user.name.trim().toUpperCase()}", &c), "ANN");
    assert_eq!(tse::render("${'abc'.includes('b')}", &c), "true");
}

#[test]
fn number_formatting() {
    assert_eq!(eval("(2.345).toFixed(1)"), Some(json!("2.3")));
    assert_eq!(eval("round(2.5)"), Some(json!(3)));
    assert_eq!(eval("round(-2.5)"), Some(json!(-2)));
    assert_eq!(eval("Number('42') + 1"), Some(json!(43)));
    assert_eq!(eval("String(12) + 1"), Some(json!("121")));
}

#[test]
fn arity_is_checked() {
    assert!(matches!(
        tse::eval("trim('a', 'b')", &Map::new()),
        Err(EvalError::Type(_))
    ));
}

#[test]
fn custom_function_reaches_the_engine() {
    struct Greet;
    impl Function for Greet {
        fn name(&self) -> &'static str {
            "greet"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn call(&self, args: &[Value]) -> tse::errors::Result<Value> {
            Ok(json!(format!("Hello, {}!", args[0].as_str().unwrap_or("you"))))
        }
    }

    let mut registry = Registry::with_builtins();
    registry.register(Greet);
    let evaluator = Arc::new(BuiltinEvaluator::new(registry));
    let mut engine = Engine::with_evaluator(Document::new(), evaluator).unwrap();
    engine.add_to_context(ctx(json!({"who": "Ann"})));
    assert_eq!(engine.evaluate_text("${greet(who)}"), "Hello, Ann!");
}
