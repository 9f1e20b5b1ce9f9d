// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Recursive macro expansion over `{...}` templates, with TEFINAE: a macro
//! that fails to resolve is left as literal text rather than erroring,
//! except when [`expand_required`] is used to obtain a final, concrete value
//! (e.g. a task's command line).

mod eval;

use regex::Regex;
use std::sync::LazyLock;

use crate::config::Config;
use crate::error::{ExpandError, Result};
use crate::value::Value;

pub const MAX_EXPAND_DEPTH: usize = 20;

static MACRO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"));

/// Expands every macro in `value` against `config`, looping until a fixed
/// point or [`MAX_EXPAND_DEPTH`] passes. Unresolved macros are left as
/// literal `{...}` text (TEFINAE).
///
/// # Errors
///
/// This function itself does not error on unresolved macros; it can still
/// fail if expanding a nested `Value::Config` hits a poisoned lock or
/// similar internal failure.
pub fn expand(value: &Value, config: &Config) -> Result<Value> {
    match value {
        Value::Str(s) => Ok(Value::Str(expand_str(s, config)?)),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(expand(item, config)?);
            }
            Ok(Value::List(out))
        }
        Value::Map(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), expand(v, config)?);
            }
            Ok(Value::Map(out))
        }
        other => Ok(other.clone()),
    }
}

/// Expands `value` and returns an error if any `{...}` macro remains
/// unresolved afterward. Used when building a task's final command line,
/// where an unresolved macro is a real error, not TEFINAE.
///
/// # Errors
///
/// Returns [`ExpandError::UnresolvedMacro`] if expansion left a literal
/// `{...}` span in the result.
pub fn expand_required(value: &Value, config: &Config) -> Result<Value> {
    let expanded = expand(value, config)?;
    if expanded.has_macro() {
        let text = expanded.to_string();
        let macro_text = MACRO_RE
            .find(&text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return Err(ExpandError::UnresolvedMacro { text, macro_text }.into());
    }
    Ok(expanded)
}

fn expand_str(input: &str, config: &Config) -> Result<String> {
    let mut current = input.to_string();
    for _ in 0..MAX_EXPAND_DEPTH {
        if !MACRO_RE.is_match(&current) {
            return Ok(current);
        }
        let mut changed = false;
        let mut out = String::with_capacity(current.len());
        let mut last_end = 0;
        for m in MACRO_RE.find_iter(&current) {
            out.push_str(&current[last_end..m.start()]);
            let inner = &m.as_str()[1..m.as_str().len() - 1];
            match eval::eval(inner, config) {
                Ok(value) => {
                    out.push_str(&value.to_string());
                    changed = true;
                }
                Err(_) => {
                    // TEFINAE: leave the macro text in place for this pass.
                    out.push_str(m.as_str());
                }
            }
            last_end = m.end();
        }
        out.push_str(&current[last_end..]);
        if !changed {
            return Ok(out);
        }
        current = out;
    }
    Err(ExpandError::RecursionLimit {
        text: input.to_string(),
        limit: MAX_EXPAND_DEPTH,
    }
    .into())
}
