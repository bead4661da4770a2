//! Patch operations over JSON documents.
//!
//! One operation is one atomic change: `add`, `remove`, `replace` or `test`,
//! addressed by a JSON pointer. `apply_all` replays a log in arrival order
//! and fails on the first operation whose precondition does not hold against
//! the document, which is how external edits are detected. `diff` produces
//! the minimal operation list turning one value into another.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Test,
}

impl Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
            OpKind::Test => "test",
        };
        write!(f, "{}", name)
    }
}

/// One atomic change to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: OpKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOp {
    pub fn add(path: impl Into<String>, value: Value) -> PatchOp {
        PatchOp {
            op: OpKind::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> PatchOp {
        PatchOp {
            op: OpKind::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> PatchOp {
        PatchOp {
            op: OpKind::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn test(path: impl Into<String>, value: Value) -> PatchOp {
        PatchOp {
            op: OpKind::Test,
            path: path.into(),
            value: Some(value),
        }
    }

    pub(crate) fn prefixed(self, prefix: &str) -> PatchOp {
        PatchOp {
            path: format!("{}{}", prefix, self.path),
            ..self
        }
    }
}

impl Display for PatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.op, self.path)
    }
}

/// Why an operation could not be applied.
#[derive(Debug, Error)]
#[error("cannot apply {op} at '{path}': {reason}")]
pub struct PatchError {
    pub op: String,
    pub path: String,
    pub reason: String,
}

fn fail(op: &PatchOp, reason: impl Into<String>) -> PatchError {
    PatchError {
        op: op.op.to_string(),
        path: op.path.clone(),
        reason: reason.into(),
    }
}

pub(crate) fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// The path token for a row's document key.
pub(crate) fn token_from_value(value: &Value) -> Result<String, EngineError> {
    match value {
        Value::String(s) => Ok(escape_token(s)),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(EngineError::ConversionFailed {
            expected: "path token",
            value: other.to_string(),
        }),
    }
}

fn split_pointer(op: &PatchOp) -> Result<Vec<String>, PatchError> {
    if op.path.is_empty() {
        return Ok(Vec::new());
    }
    match op.path.strip_prefix('/') {
        Some(rest) => Ok(rest.split('/').map(unescape_token).collect()),
        None => Err(fail(op, "path does not start with '/'")),
    }
}

fn parse_index(token: &str, len: usize, allow_end: bool, op: &PatchOp) -> Result<usize, PatchError> {
    let index: usize = token
        .parse()
        .map_err(|_| fail(op, format!("invalid array index '{}'", token)))?;
    let out_of_range = if allow_end { index > len } else { index >= len };
    if out_of_range {
        return Err(fail(
            op,
            format!("index {} out of range for length {}", index, len),
        ));
    }
    Ok(index)
}

fn required_value(op: &PatchOp) -> Result<Value, PatchError> {
    match &op.value {
        Some(value) => Ok(value.clone()),
        None => Err(fail(op, "operation requires a value")),
    }
}

fn walk<'a>(
    document: &'a mut Value,
    tokens: &[String],
    op: &PatchOp,
) -> Result<&'a mut Value, PatchError> {
    let mut current = document;
    for token in tokens {
        current = match current {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| fail(op, format!("no member '{}'", token)))?,
            Value::Array(items) => {
                let index = parse_index(token, items.len(), false, op)?;
                &mut items[index]
            }
            _ => return Err(fail(op, "path traverses a non-container")),
        };
    }
    Ok(current)
}

/// Apply one operation in place.
pub fn apply(document: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    let mut tokens = split_pointer(op)?;

    let last = match tokens.pop() {
        Some(last) => last,
        None => {
            // Whole-document operations.
            return match op.op {
                OpKind::Add | OpKind::Replace => {
                    *document = required_value(op)?;
                    Ok(())
                }
                OpKind::Test => {
                    if *document == required_value(op)? {
                        Ok(())
                    } else {
                        Err(fail(op, "value mismatch"))
                    }
                }
                OpKind::Remove => Err(fail(op, "cannot remove the document root")),
            };
        }
    };

    let parent = walk(document, &tokens, op)?;
    match op.op {
        OpKind::Add => {
            let value = required_value(op)?;
            match parent {
                Value::Object(map) => {
                    map.insert(last, value);
                    Ok(())
                }
                Value::Array(items) => {
                    if last == "-" {
                        items.push(value);
                    } else {
                        let index = parse_index(&last, items.len(), true, op)?;
                        items.insert(index, value);
                    }
                    Ok(())
                }
                _ => Err(fail(op, "parent is not a container")),
            }
        }
        OpKind::Remove => match parent {
            Value::Object(map) => match map.shift_remove(&last) {
                Some(_) => Ok(()),
                None => Err(fail(op, format!("no member '{}'", last))),
            },
            Value::Array(items) => {
                let index = parse_index(&last, items.len(), false, op)?;
                items.remove(index);
                Ok(())
            }
            _ => Err(fail(op, "parent is not a container")),
        },
        OpKind::Replace => {
            let value = required_value(op)?;
            let target = walk(parent, std::slice::from_ref(&last), op)?;
            *target = value;
            Ok(())
        }
        OpKind::Test => {
            let expected = required_value(op)?;
            let target = walk(parent, std::slice::from_ref(&last), op)?;
            if *target == expected {
                Ok(())
            } else {
                Err(fail(op, "value mismatch"))
            }
        }
    }
}

/// Replay a whole log in arrival order. The document is consumed so a
/// mid-log failure never leaks a half-patched value.
pub fn apply_all(document: Value, patches: &[PatchOp]) -> Result<Value, PatchError> {
    let mut patched = document;
    for op in patches {
        apply(&mut patched, op)?;
    }
    Ok(patched)
}

/// The minimal operation list turning `before` into `after`.
///
/// Objects diff by key, arrays by position with tail additions and removals,
/// everything else becomes a `replace`. Paths are relative to the compared
/// values; callers qualify them with the row's document key.
pub fn diff(before: &Value, after: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_value("", before, after, &mut ops);
    ops
}

fn diff_value(path: &str, before: &Value, after: &Value, ops: &mut Vec<PatchOp>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            for (key, b_val) in b {
                let child = format!("{}/{}", path, escape_token(key));
                match a.get(key) {
                    Some(a_val) => diff_value(&child, b_val, a_val, ops),
                    None => ops.push(PatchOp::remove(child)),
                }
            }
            for (key, a_val) in a {
                if !b.contains_key(key) {
                    let child = format!("{}/{}", path, escape_token(key));
                    ops.push(PatchOp::add(child, a_val.clone()));
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            let common = b.len().min(a.len());
            for index in 0..common {
                diff_value(&format!("{}/{}", path, index), &b[index], &a[index], ops);
            }
            for index in common..a.len() {
                ops.push(PatchOp::add(format!("{}/{}", path, index), a[index].clone()));
            }
            for index in (common..b.len()).rev() {
                ops.push(PatchOp::remove(format!("{}/{}", path, index)));
            }
        }
        _ => ops.push(PatchOp::replace(path.to_string(), after.clone())),
    }
}
