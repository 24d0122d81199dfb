pub mod config;
pub mod context;
pub mod disable;
pub mod dom;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod functions; // plugin model
pub mod template;
pub mod value;

mod comparison;
mod expression;
mod intercept;
mod parser;
mod pipeline;
mod scanner;

use std::sync::Arc;

use serde_json::{Map, Value};

use context::{Context, Scope};
use errors::Result;
use evaluator::{BuiltinEvaluator, ExpressionEvaluator};

pub use config::{Config, ConfigOverrides};
pub use dom::{Document, NodeId};
pub use engine::{ContentMode, Engine, VERSION};
pub use errors::{EngineError, EvalError};
pub use functions::{Function, Registry};

/// Evaluate one expression against `context` with the built-in evaluator.
///
/// Unlike the engine, errors are returned instead of rendered inline.
pub fn eval(expression: &str, context: &Map<String, Value>) -> Result<Option<Value>> {
    let empty = Map::new();
    BuiltinEvaluator::default().evaluate(expression, &Scope::new(context, &empty))
}

/// Substitute every `${...}` placeholder in `text` using `context`.
pub fn render(text: &str, context: &Map<String, Value>) -> String {
    let core = engine::Core::new(
        Config::default(),
        Context::new(context.clone()),
        Arc::new(BuiltinEvaluator::default()),
    );
    core.evaluate_text(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(v: Value) -> Map<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn eval_reports_errors() {
        assert_eq!(eval("a * 2", &ctx(json!({"a": 21}))), Ok(Some(json!(42))));
        assert_eq!(eval("b", &Map::new()), Err(EvalError::Reference("b".into())));
    }

    #[test]
    fn render_substitutes_inline() {
        let out = render("${user.name} has ${items.length} items", &ctx(json!({
            "user": {"name": "Ann"},
            "items": [1, 2, 3]
        })));
        assert_eq!(out, "Ann has 3 items");
        assert_eq!(render("${nope}", &Map::new()), "[Error: nope is not defined]");
    }
}
