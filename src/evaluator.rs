use serde_json::Value;

use crate::comparison::{cmp_values, loose_eq, strict_eq};
use crate::context::Scope;
use crate::errors::{EvalError, Result};
use crate::expression::{self, BinaryOp, ENode, LogicalOp, UnaryOp};
use crate::functions::Registry;
use crate::value::{is_stringish, number_value, to_display_string, to_number, truthy, type_of};

/// The host's expression capability: evaluate `expression` against `scope`.
///
/// `Ok(None)` is the absent (`undefined`) result. Implementations operate on
/// trusted input only.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, scope: &Scope<'_>) -> Result<Option<Value>>;
}

/// Interpreter for the JavaScript-flavoured expression subset.
#[derive(Clone)]
pub struct BuiltinEvaluator {
    registry: Registry,
}

impl Default for BuiltinEvaluator {
    fn default() -> Self {
        Self::new(Registry::with_builtins())
    }
}

impl BuiltinEvaluator {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl ExpressionEvaluator for BuiltinEvaluator {
    fn evaluate(&self, expression: &str, scope: &Scope<'_>) -> Result<Option<Value>> {
        let ast = expression::parse_expr(expression).map_err(|e| EvalError::Parse(e.to_string()))?;
        Interpreter {
            scope,
            registry: &self.registry,
        }
        .eval(&ast)
    }
}

struct Interpreter<'s, 'a> {
    scope: &'s Scope<'a>,
    registry: &'s Registry,
}

impl Interpreter<'_, '_> {
    fn eval(&self, node: &ENode) -> Result<Option<Value>> {
        match node {
            ENode::Literal(v) => Ok(Some(v.clone())),
            ENode::Undefined => Ok(None),
            ENode::Ident(name) => self
                .scope
                .lookup(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| EvalError::Reference(name.clone())),
            ENode::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| Ok(self.eval(item)?.unwrap_or(Value::Null)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Value::Array(values)))
            }
            ENode::Member {
                object,
                property,
                optional,
            } => {
                let target = self.eval(object)?;
                if *optional && matches!(target, None | Some(Value::Null)) {
                    return Ok(None);
                }
                member(target.as_ref(), property)
            }
            ENode::Index { object, index } => {
                let target = self.eval(object)?;
                let key = to_display_string(self.eval(index)?.as_ref());
                member(target.as_ref(), &key)
            }
            ENode::Call {
                name,
                receiver,
                args,
            } => self.call(name, receiver.as_deref(), args),
            ENode::Unary { op, operand } => self.unary(*op, operand),
            ENode::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, l.as_ref(), r.as_ref()).map(Some)
            }
            ENode::Logical { op, left, right } => {
                let l = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !truthy(l.as_ref()),
                    LogicalOp::Or => truthy(l.as_ref()),
                    LogicalOp::Nullish => !matches!(l, None | Some(Value::Null)),
                };
                if short_circuit {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            ENode::Conditional {
                test,
                then,
                otherwise,
            } => {
                if truthy(self.eval(test)?.as_ref()) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn unary(&self, op: UnaryOp, operand: &ENode) -> Result<Option<Value>> {
        // typeof tolerates unbound names.
        if let (UnaryOp::TypeOf, ENode::Ident(name)) = (op, operand) {
            if !self.scope.contains(name) {
                return Ok(Some(Value::from("undefined")));
            }
        }
        let v = self.eval(operand)?;
        match op {
            UnaryOp::Not => Ok(Some(Value::Bool(!truthy(v.as_ref())))),
            UnaryOp::Neg => number_value(-to_number(v.as_ref())).map(Some),
            UnaryOp::Plus => number_value(to_number(v.as_ref())).map(Some),
            UnaryOp::TypeOf => Ok(Some(Value::from(type_of(v.as_ref())))),
        }
    }

    fn call(&self, name: &str, receiver: Option<&ENode>, args: &[ENode]) -> Result<Option<Value>> {
        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(receiver) = receiver {
            let target = self.eval(receiver)?;
            if matches!(target, None | Some(Value::Null)) {
                return Err(EvalError::Type(format!(
                    "Cannot read properties of {} (reading '{name}')",
                    to_display_string(target.as_ref())
                )));
            }
            values.push(target.unwrap_or(Value::Null));
        }
        for arg in args {
            values.push(self.eval(arg)?.unwrap_or(Value::Null));
        }
        let function = self
            .registry
            .get(name)
            .ok_or_else(|| EvalError::Type(format!("{name} is not a function")))?;
        if !function.arity().contains(&values.len()) {
            return Err(EvalError::Type(format!(
                "{name} expects {} to {} arguments, got {}",
                function.arity().start(),
                function.arity().end(),
                values.len()
            )));
        }
        function.call(&values).map(Some)
    }
}

fn member(target: Option<&Value>, property: &str) -> Result<Option<Value>> {
    match target {
        None | Some(Value::Null) => Err(EvalError::Type(format!(
            "Cannot read properties of {} (reading '{property}')",
            to_display_string(target)
        ))),
        Some(Value::Object(map)) => Ok(map.get(property).cloned()),
        Some(Value::Array(items)) => {
            if property == "length" {
                return Ok(Some(Value::from(items.len())));
            }
            Ok(property
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .cloned())
        }
        Some(Value::String(s)) => {
            if property == "length" {
                return Ok(Some(Value::from(s.chars().count())));
            }
            Ok(property
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string())))
        }
        Some(_) => Ok(None),
    }
}

fn binary(op: BinaryOp, l: Option<&Value>, r: Option<&Value>) -> Result<Value> {
    let arith = |f: fn(f64, f64) -> f64| number_value(f(to_number(l), to_number(r)));
    match op {
        BinaryOp::Add => {
            if is_stringish(l) || is_stringish(r) {
                Ok(Value::String(to_display_string(l) + &to_display_string(r)))
            } else {
                arith(|a, b| a + b)
            }
        }
        BinaryOp::Sub => arith(|a, b| a - b),
        BinaryOp::Mul => arith(|a, b| a * b),
        BinaryOp::Div => arith(|a, b| a / b),
        BinaryOp::Rem => arith(|a, b| a % b),
        BinaryOp::Lt => Ok(Value::Bool(cmp_values(l, r, |o| o < 0))),
        BinaryOp::Lte => Ok(Value::Bool(cmp_values(l, r, |o| o <= 0))),
        BinaryOp::Gt => Ok(Value::Bool(cmp_values(l, r, |o| o > 0))),
        BinaryOp::Gte => Ok(Value::Bool(cmp_values(l, r, |o| o >= 0))),
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(l, r))),
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(l, r))),
        BinaryOp::StrictNe => Ok(Value::Bool(!strict_eq(l, r))),
    }
}
