//! Tree-walking evaluator for parsed expressions.
//!
//! The evaluator reads nothing but the context tree handed to it, and only
//! through `get(path)`. Lambda parameters are the only other names in scope.

use std::cmp::Ordering;

use serde_json::Value;

use crate::core::expr::ast::{BinOp, Expr, UnaryOp};
use crate::core::expr::error::ExprError;
use crate::core::expr::parser::number;
use crate::core::json::{is_truthy, json_eq, to_text};
use crate::core::world::lookup;

pub struct Evaluator<'ctx> {
    context: &'ctx Value,
    locals: Vec<(String, Value)>,
    steps: usize,
    max_steps: usize,
}

impl<'ctx> Evaluator<'ctx> {
    pub fn new(context: &'ctx Value, max_steps: usize) -> Self {
        Self {
            context,
            locals: Vec::new(),
            steps: 0,
            max_steps,
        }
    }

    fn tick(&mut self) -> Result<(), ExprError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ExprError::BudgetExhausted);
        }
        Ok(())
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, ExprError> {
        self.tick()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Ident(name) => self
                .locals
                .iter()
                .rev()
                .find(|(local, _)| local == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| ExprError::UndefinedIdentifier(name.clone())),
            Expr::Get(path) => match self.eval(path)? {
                Value::String(path) => Ok(lookup(self.context, &path).cloned().unwrap_or(Value::Null)),
                other => Err(ExprError::mismatch(format!(
                    "get(path) expects a string path, got {}",
                    type_name(&other)
                ))),
            },
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                member(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                element(&object, &index)
            }
            Expr::Method { object, name, args } => {
                let object = self.eval(object)?;
                self.eval_method(&object, name, args)
            }
            Expr::Lambda { .. } => Err(ExprError::mismatch(
                "functions can only be passed to array methods",
            )),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                    UnaryOp::Neg => Ok(number(-as_number(&value, "-")?)),
                }
            }
            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if is_truthy(&self.eval(test)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Result<Value, ExprError> {
        let lv = self.eval(left)?;
        match op {
            BinOp::And if !is_truthy(&lv) => return Ok(lv),
            BinOp::Or if is_truthy(&lv) => return Ok(lv),
            BinOp::And | BinOp::Or => return self.eval(right),
            _ => {}
        }
        let rv = self.eval(right)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(json_eq(&lv, &rv))),
            BinOp::NotEq => Ok(Value::Bool(!json_eq(&lv, &rv))),
            BinOp::Less => compare(&lv, &rv, op).map(|ord| Value::Bool(ord == Ordering::Less)),
            BinOp::LessEq => compare(&lv, &rv, op).map(|ord| Value::Bool(ord != Ordering::Greater)),
            BinOp::Greater => compare(&lv, &rv, op).map(|ord| Value::Bool(ord == Ordering::Greater)),
            BinOp::GreaterEq => compare(&lv, &rv, op).map(|ord| Value::Bool(ord != Ordering::Less)),
            BinOp::Add => match (&lv, &rv) {
                (Value::Number(_), Value::Number(_)) => {
                    Ok(number(as_number(&lv, "+")? + as_number(&rv, "+")?))
                }
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Ok(Value::String(format!("{}{}", to_text(&lv), to_text(&rv))))
                }
                _ => Err(ExprError::mismatch(format!(
                    "cannot add {} and {}",
                    type_name(&lv),
                    type_name(&rv)
                ))),
            },
            BinOp::Sub => Ok(number(as_number(&lv, "-")? - as_number(&rv, "-")?)),
            BinOp::Mul => Ok(number(as_number(&lv, "*")? * as_number(&rv, "*")?)),
            BinOp::Div | BinOp::Mod => {
                let a = as_number(&lv, op.symbol())?;
                let b = as_number(&rv, op.symbol())?;
                if b == 0.0 {
                    return Err(ExprError::ArithmeticTrap(format!("{} by zero", op.symbol())));
                }
                Ok(number(if op == BinOp::Div { a / b } else { a % b }))
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_method(&mut self, object: &Value, name: &str, args: &[Expr]) -> Result<Value, ExprError> {
        match (object, name) {
            (Value::Array(items), "some" | "every" | "filter" | "find" | "map") => {
                let lambda = single_arg(args, name)?;
                let mut mapped = Vec::new();
                for item in items {
                    let result = self.call(lambda, item.clone())?;
                    let hit = is_truthy(&result);
                    match name {
                        "some" if hit => return Ok(Value::Bool(true)),
                        "every" if !hit => return Ok(Value::Bool(false)),
                        "find" if hit => return Ok(item.clone()),
                        "filter" if hit => mapped.push(item.clone()),
                        "map" => mapped.push(result),
                        _ => {}
                    }
                }
                Ok(match name {
                    "some" => Value::Bool(false),
                    "every" => Value::Bool(true),
                    "find" => Value::Null,
                    _ => Value::Array(mapped),
                })
            }
            (Value::Array(items), "includes") => {
                let wanted = self.eval(single_arg(args, name)?)?;
                Ok(Value::Bool(items.iter().any(|item| json_eq(item, &wanted))))
            }
            (Value::Array(items), "indexOf") => {
                let wanted = self.eval(single_arg(args, name)?)?;
                let index = items.iter().position(|item| json_eq(item, &wanted));
                Ok(index.map_or(Value::from(-1), Value::from))
            }
            (Value::Array(items), "join") => {
                let separator = match args.first() {
                    Some(arg) => to_text(&self.eval(arg)?),
                    None => ",".to_string(),
                };
                let parts: Vec<String> = items.iter().map(to_text).collect();
                Ok(Value::String(parts.join(&separator)))
            }
            (Value::String(text), "includes" | "startsWith" | "endsWith") => {
                let needle = to_text(&self.eval(single_arg(args, name)?)?);
                Ok(Value::Bool(match name {
                    "includes" => text.contains(&needle),
                    "startsWith" => text.starts_with(&needle),
                    _ => text.ends_with(&needle),
                }))
            }
            (Value::String(text), "toLowerCase") => Ok(Value::String(text.to_lowercase())),
            (Value::String(text), "toUpperCase") => Ok(Value::String(text.to_uppercase())),
            (Value::String(text), "trim") => Ok(Value::String(text.trim().to_string())),
            (Value::String(text), "split") => {
                let separator = to_text(&self.eval(single_arg(args, name)?)?);
                Ok(Value::Array(
                    text.split(separator.as_str())
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ))
            }
            _ => Err(ExprError::UnknownFunction(format!(
                "{}.{name}()",
                type_name(object)
            ))),
        }
    }

    fn call(&mut self, lambda: &Expr, arg: Value) -> Result<Value, ExprError> {
        let Expr::Lambda { param, body } = lambda else {
            return Err(ExprError::mismatch("expected a function like `x => ...`"));
        };
        self.locals.push((param.clone(), arg));
        let result = self.eval(body);
        self.locals.pop();
        result
    }
}

fn single_arg<'a>(args: &'a [Expr], name: &str) -> Result<&'a Expr, ExprError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(ExprError::mismatch(format!(".{name}() takes exactly one argument"))),
    }
}

fn member(object: &Value, property: &str) -> Result<Value, ExprError> {
    match (object, property) {
        (Value::Null, _) => Err(ExprError::mismatch(format!(
            "cannot read property '{property}' of null"
        ))),
        (Value::Array(items), "length") => Ok(Value::from(items.len())),
        (Value::String(text), "length") => Ok(Value::from(text.chars().count())),
        (Value::Object(map), _) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn element(object: &Value, index: &Value) -> Result<Value, ExprError> {
    match (object, index) {
        (Value::Null, _) => Err(ExprError::mismatch("cannot index into null")),
        (Value::Array(items), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(text), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| text.chars().nth(i as usize))
            .map_or(Value::Null, |ch| Value::String(ch.to_string()))),
        (Value::Object(map), Value::String(key)) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        (_, key) => member(object, &to_text(key)),
    }
}

fn as_number(value: &Value, op: &str) -> Result<f64, ExprError> {
    value.as_f64().ok_or_else(|| {
        ExprError::mismatch(format!("operator {op} expects numbers, got {}", type_name(value)))
    })
}

fn compare(left: &Value, right: &Value, op: BinOp) -> Result<Ordering, ExprError> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let (a, b) = (as_number(left, op.symbol())?, as_number(right, op.symbol())?);
            a.partial_cmp(&b)
                .ok_or_else(|| ExprError::mismatch("cannot order NaN"))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::mismatch(format!(
            "cannot compare {} {} {}",
            type_name(left),
            op.symbol(),
            type_name(right)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
