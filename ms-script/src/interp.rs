use std::collections::HashMap;

use serde_json::{Map, Number, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ast::{BinaryOp, Expr, LogicalOp, PathSegment, Place, Stmt, UnaryOp};
use crate::builtins::BuiltinFunction;
use crate::host::{HostCallContext, HostError, HostFunctionRegistry};
use crate::sandbox::SandboxConfig;

/// Why an evaluation stopped early.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Halt {
    Script(String),
    Cancelled,
}

type EvalResult<T> = Result<T, Halt>;

pub(crate) struct Budget {
    token: CancellationToken,
    deadline: Instant,
    max_steps: u64,
    steps: u64,
    max_value_bytes: usize,
    /// Net bytes written into existing arrays and objects.
    grown: usize,
}

impl Budget {
    pub(crate) fn new(token: CancellationToken, deadline: Instant, limits: &SandboxConfig) -> Self {
        Self {
            token,
            deadline,
            max_steps: limits.max_steps,
            steps: 0,
            max_value_bytes: limits.max_value_bytes,
            grown: 0,
        }
    }

    fn check_size(&self, value: &Value, line: u32) -> EvalResult<()> {
        if approx_size(value, self.max_value_bytes) > self.max_value_bytes {
            return Err(self.size_exceeded(line));
        }
        Ok(())
    }

    fn grow(&mut self, added: usize, removed: usize, line: u32) -> EvalResult<()> {
        self.grown = self.grown.saturating_sub(removed).saturating_add(added);
        if self.grown > self.max_value_bytes {
            return Err(self.size_exceeded(line));
        }
        Ok(())
    }

    fn size_exceeded(&self, line: u32) -> Halt {
        script_error(
            line,
            format!("value exceeds size limit of {} bytes", self.max_value_bytes),
        )
    }

    fn tick(&mut self, line: u32) -> EvalResult<()> {
        if self.token.is_cancelled() || Instant::now() >= self.deadline {
            return Err(Halt::Cancelled);
        }
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(Halt::Script(format!(
                "line {line}: step budget of {} exceeded",
                self.max_steps
            )));
        }
        Ok(())
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

enum AccessKey {
    Name(String),
    Value(Value),
}

pub(crate) struct Interpreter<'a> {
    scopes: Vec<HashMap<String, Value>>,
    host: &'a HostFunctionRegistry,
    ctx: &'a HostCallContext,
    budget: Budget,
    output: Option<Value>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        globals: HashMap<String, Value>,
        host: &'a HostFunctionRegistry,
        ctx: &'a HostCallContext,
        budget: Budget,
    ) -> Self {
        Self {
            scopes: vec![globals],
            host,
            ctx,
            budget,
            output: None,
        }
    }

    /// Runs the program. The result is the last `out` value, else the returned
    /// value, else null.
    pub(crate) fn run(mut self, program: &[Stmt]) -> EvalResult<Value> {
        let returned = match self.exec_stmts(program)? {
            Flow::Return(value) => Some(value),
            Flow::Normal | Flow::Break | Flow::Continue => None,
        };
        Ok(self.output.or(returned).unwrap_or(Value::Null))
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        self.scopes.push(HashMap::new());
        let flow = self.exec_stmts(stmts);
        self.scopes.pop();
        flow
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Let { name, value, line } => {
                self.budget.tick(*line)?;
                let value = match value {
                    Some(expr) => self.eval(expr, *line)?,
                    None => Value::Null,
                };
                self.budget.check_size(&value, *line)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Assign { place, value, line } => {
                self.budget.tick(*line)?;
                let value = self.eval(value, *line)?;
                self.assign(place, value, *line)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                line,
            } => {
                self.budget.tick(*line)?;
                if truthy(&self.eval(condition, *line)?) {
                    self.exec_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While {
                condition,
                body,
                line,
            } => {
                loop {
                    self.budget.tick(*line)?;
                    if !truthy(&self.eval(condition, *line)?) {
                        break;
                    }
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
                line,
            } => {
                self.budget.tick(*line)?;
                let items: Box<dyn Iterator<Item = Value>> = match self.eval(iterable, *line)? {
                    Value::Array(items) => Box::new(items.into_iter()),
                    Value::String(text) => Box::new(string_chars(text)),
                    other => {
                        return Err(script_error(
                            *line,
                            format!("{} is not iterable", type_name(&other)),
                        ));
                    }
                };
                for item in items {
                    self.budget.tick(*line)?;
                    self.scopes
                        .push(HashMap::from([(binding.clone(), item)]));
                    let flow = self.exec_stmts(body);
                    self.scopes.pop();
                    match flow? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break { line } => {
                self.budget.tick(*line)?;
                Ok(Flow::Break)
            }
            Stmt::Continue { line } => {
                self.budget.tick(*line)?;
                Ok(Flow::Continue)
            }
            Stmt::Return { value, line } => {
                self.budget.tick(*line)?;
                let value = match value {
                    Some(expr) => self.eval(expr, *line)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Expr { expr, line } => {
                self.budget.tick(*line)?;
                self.eval(expr, *line)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, expr: &Expr, line: u32) -> EvalResult<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Number(value) => Ok(Value::Number(value.clone())),
            Expr::String(value) => Ok(Value::String(value.clone())),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, line)?);
                }
                let out = Value::Array(out);
                self.budget.check_size(&out, line)?;
                Ok(out)
            }
            Expr::Object(entries) => {
                let mut out = Map::new();
                for (key, value) in entries {
                    let value = self.eval(value, line)?;
                    out.insert(key.clone(), value);
                }
                let out = Value::Object(out);
                self.budget.check_size(&out, line)?;
                Ok(out)
            }
            Expr::Ident(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| script_error(line, format!("'{name}' is not defined"))),
            Expr::Member { .. } | Expr::Index { .. } => self.eval_access(expr, line),
            Expr::Call { callee, args } => self.eval_call(callee, args, line),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, line)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => negate(&value, line),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, line)?;
                let rhs = self.eval(rhs, line)?;
                if *op == BinaryOp::Add && (lhs.is_string() || rhs.is_string()) {
                    let limit = self.budget.max_value_bytes;
                    let joined = approx_size(&lhs, limit).saturating_add(approx_size(&rhs, limit));
                    if joined > limit {
                        return Err(self.budget.size_exceeded(line));
                    }
                }
                binary(*op, &lhs, &rhs, line)
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs, line)?;
                match (op, truthy(&lhs)) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(lhs),
                    _ => self.eval(rhs, line),
                }
            }
            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                if truthy(&self.eval(condition, line)?) {
                    self.eval(then_value, line)
                } else {
                    self.eval(else_value, line)
                }
            }
        }
    }

    fn eval_access(&mut self, expr: &Expr, line: u32) -> EvalResult<Value> {
        let mut chain = Vec::new();
        let mut base = expr;
        loop {
            match base {
                Expr::Member { object, .. } | Expr::Index { object, .. } => {
                    chain.push(base);
                    base = object.as_ref();
                }
                _ => break,
            }
        }
        chain.reverse();

        let mut keys = Vec::with_capacity(chain.len());
        for step in chain {
            match step {
                Expr::Member { property, .. } => keys.push(AccessKey::Name(property.clone())),
                Expr::Index { index, .. } => keys.push(AccessKey::Value(self.eval(index, line)?)),
                _ => {}
            }
        }

        if let Expr::Ident(name) = base {
            let root = self
                .lookup(name)
                .ok_or_else(|| script_error(line, format!("'{name}' is not defined")))?;
            navigate(root, &keys, line)
        } else {
            let root = self.eval(base, line)?;
            navigate(&root, &keys, line)
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], line: u32) -> EvalResult<Value> {
        self.budget.tick(line)?;
        let Some(name) = callee.callee_path() else {
            return Err(script_error(line, "expression is not callable"));
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, line)?);
        }

        if let Some(builtin) = BuiltinFunction::from_name(&name) {
            return self.call_builtin(builtin, values, line);
        }

        let host = self.host;
        let Some(entry) = host.lookup(&name) else {
            return Err(script_error(line, format!("'{name}' is not a function")));
        };
        let result = entry.function.call(self.ctx, values);
        self.budget.tick(line)?;
        match result {
            Ok(value) => Ok(value),
            Err(HostError::Cancelled) => Err(Halt::Cancelled),
            Err(HostError::Failed(message)) => {
                Err(script_error(line, format!("{name} failed: {message}")))
            }
        }
    }

    fn call_builtin(
        &mut self,
        builtin: BuiltinFunction,
        mut args: Vec<Value>,
        line: u32,
    ) -> EvalResult<Value> {
        let arg = if args.is_empty() {
            Value::Null
        } else {
            args.swap_remove(0)
        };
        match builtin {
            BuiltinFunction::Out => {
                self.output = Some(arg.clone());
                Ok(arg)
            }
            BuiltinFunction::Len => match &arg {
                Value::String(text) => Ok(Value::from(text.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                other => Err(script_error(
                    line,
                    format!("len expects string, array or object, got {}", type_name(other)),
                )),
            },
            BuiltinFunction::Keys => match arg {
                Value::Object(map) => Ok(Value::Array(
                    map.into_iter().map(|(key, _)| Value::String(key)).collect(),
                )),
                other => Err(script_error(
                    line,
                    format!("keys expects object, got {}", type_name(&other)),
                )),
            },
            BuiltinFunction::Str => Ok(Value::String(display(&arg))),
            BuiltinFunction::Num => to_number(&arg)
                .map(Value::Number)
                .ok_or_else(|| script_error(line, format!("cannot convert {} to number", display(&arg)))),
            BuiltinFunction::Log => {
                info!("script log line={line}: {}", display(&arg));
                Ok(Value::Null)
            }
            BuiltinFunction::JsonParse => match arg {
                Value::String(text) => {
                    let parsed = serde_json::from_str(&text)
                        .map_err(|err| script_error(line, format!("JSON.parse: {err}")))?;
                    self.budget.check_size(&parsed, line)?;
                    Ok(parsed)
                }
                other => Err(script_error(
                    line,
                    format!("JSON.parse expects string, got {}", type_name(&other)),
                )),
            },
            BuiltinFunction::JsonStringify => {
                let text = serde_json::to_string(&arg)
                    .map_err(|err| script_error(line, format!("JSON.stringify: {err}")))?;
                if text.len() > self.budget.max_value_bytes {
                    return Err(self.budget.size_exceeded(line));
                }
                Ok(Value::String(text))
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    fn assign(&mut self, place: &Place, value: Value, line: u32) -> EvalResult<()> {
        let mut keys = Vec::with_capacity(place.path.len());
        for segment in &place.path {
            match segment {
                PathSegment::Key(key) => keys.push(AccessKey::Name(key.clone())),
                PathSegment::Index(index) => keys.push(AccessKey::Value(self.eval(index, line)?)),
            }
        }

        let Some((last, parents)) = keys.split_last() else {
            self.budget.check_size(&value, line)?;
            match self.lookup_mut(&place.root) {
                Some(slot) => *slot = value,
                None => {
                    if let Some(globals) = self.scopes.first_mut() {
                        globals.insert(place.root.clone(), value);
                    }
                }
            }
            return Ok(());
        };

        let added = approx_size(&value, self.budget.max_value_bytes);
        let root = place.root.as_str();
        let mut target = self
            .lookup_mut(root)
            .ok_or_else(|| script_error(line, format!("'{root}' is not defined")))?;
        for key in parents {
            target = child_mut(target, key, line)?;
        }
        let replaced = store_into(target, last, value, line)?;
        let removed = replaced.map_or(0, |old| approx_size(&old, usize::MAX));
        self.budget.grow(added, removed, line)
    }
}

fn script_error(line: u32, message: impl std::fmt::Display) -> Halt {
    Halt::Script(format!("line {line}: {message}"))
}

fn navigate(base: &Value, keys: &[AccessKey], line: u32) -> EvalResult<Value> {
    let mut current = base;
    for (position, key) in keys.iter().enumerate() {
        match lookup_key(current, key, line)? {
            Lookup::Ref(next) => current = next,
            Lookup::Owned(value) => return navigate(&value, &keys[position + 1..], line),
        }
    }
    Ok(current.clone())
}

enum Lookup<'v> {
    Ref(&'v Value),
    Owned(Value),
}

static NULL: Value = Value::Null;

fn lookup_key<'v>(value: &'v Value, key: &AccessKey, line: u32) -> EvalResult<Lookup<'v>> {
    match (value, key) {
        (Value::Object(map), key) => {
            let name = key_text(key);
            Ok(Lookup::Ref(map.get(&name).unwrap_or(&NULL)))
        }
        (Value::Array(items), AccessKey::Name(name)) if name == "length" => {
            Ok(Lookup::Owned(Value::from(items.len())))
        }
        (Value::Array(items), AccessKey::Value(index)) => Ok(Lookup::Ref(
            index_of(index)
                .and_then(|position| items.get(position))
                .unwrap_or(&NULL),
        )),
        (Value::String(text), AccessKey::Name(name)) if name == "length" => {
            Ok(Lookup::Owned(Value::from(text.chars().count())))
        }
        (Value::String(text), AccessKey::Value(index)) => Ok(Lookup::Owned(
            index_of(index)
                .and_then(|position| text.chars().nth(position))
                .map(|ch| Value::String(ch.to_string()))
                .unwrap_or(Value::Null),
        )),
        (Value::Null, key) => Err(script_error(
            line,
            format!("cannot read property '{}' of null", key_text(key)),
        )),
        (Value::Array(_) | Value::String(_) | Value::Bool(_) | Value::Number(_), _) => {
            Ok(Lookup::Ref(&NULL))
        }
    }
}

fn child_mut<'v>(value: &'v mut Value, key: &AccessKey, line: u32) -> EvalResult<&'v mut Value> {
    let kind = type_name(value);
    match value {
        Value::Object(map) => map
            .get_mut(&key_text(key))
            .ok_or_else(|| script_error(line, format!("cannot set property of undefined '{}'", key_text(key)))),
        Value::Array(items) => {
            let len = items.len();
            match key {
                AccessKey::Value(index) => index_of(index)
                    .and_then(|position| items.get_mut(position))
                    .ok_or_else(|| script_error(line, format!("index out of bounds for array of length {len}"))),
                AccessKey::Name(name) => Err(script_error(
                    line,
                    format!("cannot set property '{name}' on array"),
                )),
            }
        }
        _ => Err(script_error(
            line,
            format!("cannot set property '{}' on {kind}", key_text(key)),
        )),
    }
}

/// Returns the value that was replaced, if any.
fn store_into(
    target: &mut Value,
    key: &AccessKey,
    value: Value,
    line: u32,
) -> EvalResult<Option<Value>> {
    let kind = type_name(target);
    match target {
        Value::Object(map) => Ok(map.insert(key_text(key), value)),
        Value::Array(items) => {
            let position = match key {
                AccessKey::Value(index) => index_of(index),
                AccessKey::Name(_) => None,
            }
            .ok_or_else(|| script_error(line, format!("invalid array index '{}'", key_text(key))))?;
            if position < items.len() {
                Ok(Some(std::mem::replace(&mut items[position], value)))
            } else if position == items.len() {
                items.push(value);
                Ok(None)
            } else {
                Err(script_error(
                    line,
                    format!(
                        "index {position} out of bounds for array of length {}",
                        items.len()
                    ),
                ))
            }
        }
        _ => Err(script_error(
            line,
            format!("cannot set property '{}' on {kind}", key_text(key)),
        )),
    }
}

/// Rough heap footprint of `value`. Counting stops once `limit` is passed.
fn approx_size(value: &Value, limit: usize) -> usize {
    let mut total = 0usize;
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        let size = match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => 8,
            Value::String(text) => text.len(),
            Value::Array(items) => {
                pending.extend(items);
                8
            }
            Value::Object(map) => {
                pending.extend(map.values());
                map.keys().map(String::len).sum::<usize>() + 8
            }
        };
        total = total.saturating_add(size);
        if total > limit {
            break;
        }
    }
    total
}

/// One-character strings, produced as the loop advances.
fn string_chars(text: String) -> impl Iterator<Item = Value> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let ch = text.get(offset..)?.chars().next()?;
        offset += ch.len_utf8();
        Some(Value::String(ch.to_string()))
    })
}

fn key_text(key: &AccessKey) -> String {
    match key {
        AccessKey::Name(name) => name.clone(),
        AccessKey::Value(Value::String(text)) => text.clone(),
        AccessKey::Value(other) => other.to_string(),
    }
}

fn index_of(value: &Value) -> Option<usize> {
    match value {
        Value::Number(number) => {
            if let Some(index) = number.as_u64() {
                return usize::try_from(index).ok();
            }
            let float = number.as_f64()?;
            (float >= 0.0 && float.fract() == 0.0 && float <= usize::MAX as f64)
                .then_some(float as usize)
        }
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(number) => Some(number.clone()),
        Value::Bool(flag) => Some(Number::from(u8::from(*flag))),
        Value::Null => Some(Number::from(0)),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                return Some(Number::from(int));
            }
            text.parse::<f64>().ok().and_then(Number::from_f64)
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn float_value(value: f64, line: u32) -> EvalResult<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| script_error(line, "arithmetic produced a non-finite number"))
}

fn negate(value: &Value, line: u32) -> EvalResult<Value> {
    let Value::Number(number) = value else {
        return Err(script_error(
            line,
            format!("cannot negate {}", type_name(value)),
        ));
    };
    if let Some(int) = number.as_i64()
        && let Some(negated) = int.checked_neg()
    {
        return Ok(Value::from(negated));
    }
    float_value(-number.as_f64().unwrap_or(f64::NAN), line)
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value, line: u32) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(lhs, rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(lhs, rhs))),
        BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
            compare(op, lhs, rhs, line)
        }
        BinaryOp::Add if lhs.is_string() || rhs.is_string() => {
            Ok(Value::String(display(lhs) + &display(rhs)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, lhs, rhs, line)
        }
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value, line: u32) -> EvalResult<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(script_error(
                line,
                format!("cannot compare {} with {}", type_name(lhs), type_name(rhs)),
            ));
        }
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::LessEq => ordering.is_le(),
        BinaryOp::Greater => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value, line: u32) -> EvalResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(script_error(
            line,
            format!(
                "unsupported operands {} and {} for arithmetic",
                type_name(lhs),
                type_name(rhs)
            ),
        ));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    return Err(script_error(line, "division by zero"));
                }
                x.checked_rem(y)
                    .filter(|rem| *rem == 0)
                    .and_then(|_| x.checked_div(y))
            }
            BinaryOp::Rem => {
                if y == 0 {
                    return Err(script_error(line, "division by zero"));
                }
                x.checked_rem(y)
            }
            _ => None,
        };
        if let Some(value) = exact {
            return Ok(Value::from(value));
        }
    }

    let (x, y) = (
        a.as_f64().unwrap_or(f64::NAN),
        b.as_f64().unwrap_or(f64::NAN),
    );
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => {
            return Err(script_error(line, "division by zero"));
        }
        BinaryOp::Div => x / y,
        _ => x % y,
    };
    float_value(result, line)
}
