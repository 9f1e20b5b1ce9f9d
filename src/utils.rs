// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The fixed `Utils` function table exposed to `{...}` macros and to build
//! scripts. Mirrors the original engine's `Utils` namespace.

use std::path::Path;
use std::process::Command;

use crate::error::{ExpandError, Result};
use crate::paths::{self, flatten};
use crate::value::Value;

/// Dispatches a call to one of the built-in functions by name.
///
/// # Errors
///
/// Returns [`ExpandError::EvalError`] if `name` is unknown or called with
/// the wrong number/type of arguments.
pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "len" => len(args),
        "swap_ext" => swap_ext(args),
        "stem" => stem(args),
        "color" => color(args),
        "run" => run(args),
        "glob" => glob(args),
        "abs_path" => abs_path(args),
        "rel_path" => rel_path(args),
        "flatten" => flatten_fn(args),
        "joinpath" => joinpath(args),
        other => Err(ExpandError::EvalError {
            expr: format!("{other}(...)"),
            message: format!("unknown function '{other}'"),
        }
        .into()),
    }
}

fn arg_str(args: &[Value], idx: usize, fname: &str) -> Result<String> {
    args.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ExpandError::EvalError {
                expr: format!("{fname}(...)"),
                message: format!("argument {idx} must be a string"),
            }
            .into()
        })
}

fn len(args: &[Value]) -> Result<Value> {
    let n = match args.first() {
        Some(Value::Str(s)) => s.chars().count(),
        Some(Value::List(l)) => l.len(),
        Some(Value::Map(m)) => m.len(),
        _ => {
            return Err(ExpandError::EvalError {
                expr: "len(...)".to_string(),
                message: "argument must be a string, list or map".to_string(),
            }
            .into());
        }
    };
    Ok(Value::Int(n as i64))
}

fn swap_ext(args: &[Value]) -> Result<Value> {
    let path = arg_str(args, 0, "swap_ext")?;
    let ext = arg_str(args, 1, "swap_ext")?;
    Ok(Value::Str(
        paths::swap_ext(Path::new(&path), &ext)
            .to_string_lossy()
            .into_owned(),
    ))
}

fn stem(args: &[Value]) -> Result<Value> {
    let path = arg_str(args, 0, "stem")?;
    Ok(Value::Str(paths::stem(Path::new(&path)).to_string()))
}

fn color(args: &[Value]) -> Result<Value> {
    let code = args
        .first()
        .and_then(Value::as_int)
        .ok_or_else(|| ExpandError::EvalError {
            expr: "color(...)".to_string(),
            message: "first argument must be an int color code".to_string(),
        })?;
    let text = arg_str(args, 1, "color")?;
    Ok(Value::Str(paths::color(code as u8, &text)))
}

/// Runs `args[0]` through a shell, trims trailing whitespace from stdout.
///
/// Used by `{run(...)}` macros, e.g. to embed `git describe` output into a
/// version string. Not used for a task's own command execution, which goes
/// through `crate::process` instead.
fn run(args: &[Value]) -> Result<Value> {
    let cmd = arg_str(args, 0, "run")?;
    let (shell, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("/bin/sh", "-c")
    };
    let output = Command::new(shell).arg(flag).arg(&cmd).output().map_err(|e| {
        ExpandError::EvalError {
            expr: format!("run({cmd})"),
            message: e.to_string(),
        }
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Value::Str(stdout.trim_end().to_string()))
}

fn glob(args: &[Value]) -> Result<Value> {
    let pattern = arg_str(args, 0, "glob")?;
    let mut matches = Vec::new();
    match glob::glob(&pattern) {
        Ok(paths) => {
            for entry in paths.flatten() {
                matches.push(Value::Str(entry.to_string_lossy().into_owned()));
            }
        }
        Err(e) => {
            return Err(ExpandError::EvalError {
                expr: format!("glob({pattern})"),
                message: e.to_string(),
            }
            .into());
        }
    }
    Ok(Value::List(matches))
}

fn abs_path(args: &[Value]) -> Result<Value> {
    let base = arg_str(args, 0, "abs_path")?;
    let p = arg_str(args, 1, "abs_path")?;
    Ok(Value::Str(
        paths::abs_path(Path::new(&base), Path::new(&p))
            .to_string_lossy()
            .into_owned(),
    ))
}

fn rel_path(args: &[Value]) -> Result<Value> {
    let path = arg_str(args, 0, "rel_path")?;
    let base = arg_str(args, 1, "rel_path")?;
    Ok(Value::Str(
        paths::rel_path(Path::new(&path), Path::new(&base))
            .to_string_lossy()
            .into_owned(),
    ))
}

fn flatten_fn(args: &[Value]) -> Result<Value> {
    let value = args.first().cloned().unwrap_or(Value::Null);
    Ok(Value::List(
        flatten(&value).into_iter().map(Value::Str).collect(),
    ))
}

fn joinpath(args: &[Value]) -> Result<Value> {
    let parts: Vec<String> = args
        .iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect();
    Ok(Value::Str(paths::join_path(&parts).to_string_lossy().into_owned()))
}
