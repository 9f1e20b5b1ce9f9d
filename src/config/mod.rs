// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Prototypal configuration object.
//!
//! ```text
//! Config { fields: IndexMap<String, Value>, parent: Option<Arc<Config>> }
//!
//! get("x")   own fields, else parent.get("x"), else None
//! fork()     new Config whose parent is Arc<self>, own fields empty
//! merge(o)   copies every field from `o` into self's own layer
//! ```

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::error::{ConfigError, Result};
use crate::expand::expand;
use crate::value::Value;

/// Default macro strings, ported verbatim from the original engine. They are
/// plain `{...}` templates evaluated lazily against the owning config, not
/// constants, so overriding e.g. `build_root` on a child config changes the
/// computed `build_dir` of every task under it.
pub const DEFAULT_DESC: &str = "{command}";
pub const DEFAULT_TASK_DIR: &str = "{mod_dir}";
pub const DEFAULT_BUILD_DIR: &str =
    "{build_root}/{build_tag}/{repo_name}/{rel_path(task_dir, repo_dir)}";
pub const DEFAULT_BUILD_ROOT: &str = "{root_dir}/build";
pub const DEFAULT_BUILD_TAG: &str = "";

/// A prototypal, dynamically-typed key/value map with an optional parent.
///
/// Interior mutability (`RwLock`) lets a `Config` be shared via `Arc` between
/// tasks that reference it (as a dependency's config) while the owning task
/// still mutates its own fields during `task_init`.
#[derive(Debug)]
pub struct Config {
    fields: RwLock<IndexMap<String, Value>>,
    parent: Option<Arc<Config>>,
}

impl Config {
    #[must_use]
    pub fn new(parent: Option<Arc<Config>>) -> Self {
        Self {
            fields: RwLock::new(IndexMap::new()),
            parent,
        }
    }

    /// Builds the root config, pre-populated with the defaults every task's
    /// forked config inherits unless overridden.
    #[must_use]
    pub fn root() -> Self {
        let cfg = Self::new(None);
        cfg.set("desc", DEFAULT_DESC);
        cfg.set("task_dir", DEFAULT_TASK_DIR);
        cfg.set("build_dir", DEFAULT_BUILD_DIR);
        cfg.set("build_root", DEFAULT_BUILD_ROOT);
        cfg.set("build_tag", DEFAULT_BUILD_TAG);
        cfg
    }

    /// Returns a new child config whose parent is `self`. Fields set on the
    /// child shadow the parent without mutating it.
    #[must_use]
    pub fn fork(self: &Arc<Self>) -> Self {
        Self::new(Some(Arc::clone(self)))
    }

    /// Copies every field from `other` into this config's own layer
    /// (shallow, last-write-wins).
    pub fn merge(&self, other: &Self) {
        let other_fields = other.fields.read().expect("config lock poisoned").clone();
        let mut own = self.fields.write().expect("config lock poisoned");
        for (key, value) in other_fields {
            own.insert(key, value);
        }
    }

    /// Looks up `key` in this config's own layer, then walks the parent
    /// chain. Returns `None` if no layer defines it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.fields.read().expect("config lock poisoned").get(key) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(key))
    }

    /// Like [`get`](Self::get), but runs the macro expander over
    /// `Value::Str`/`Value::List` results before returning them.
    ///
    /// # Errors
    ///
    /// Returns an error if expansion hits an evaluation error in a context
    /// that requires a concrete value (see the expander's TEFINAE contract).
    pub fn get_expanded(&self, key: &str) -> Result<Option<Value>> {
        match self.get(key) {
            Some(v) => Ok(Some(expand(&v, self)?)),
            None => Ok(None),
        }
    }

    /// Like [`get_expanded`](Self::get_expanded), returning an error instead
    /// of `None` when the key is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if no layer defines `key`, or an
    /// expansion error as in [`get_expanded`](Self::get_expanded).
    pub fn require_expanded(&self, key: &str) -> Result<Value> {
        self.get_expanded(key)?
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()).into())
    }

    /// Sets `key` to `value` in this config's own layer.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields
            .write()
            .expect("config lock poisoned")
            .insert(key.into(), value.into());
    }

    /// Returns `true` if this config's own layer (not the parent chain)
    /// defines `key`.
    #[must_use]
    pub fn has_own(&self, key: &str) -> bool {
        self.fields.read().expect("config lock poisoned").contains_key(key)
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Snapshot of every key visible from this config (own layer first, then
    /// ancestors, de-duplicated by first occurrence). Used by `-d` debug dump.
    #[must_use]
    pub fn visible_keys(&self) -> Vec<String> {
        let mut seen = IndexMap::new();
        let mut cur = Some(self);
        let mut chain = Vec::new();
        // Collect the chain first since `parent` borrows are tied to `Arc`s.
        let mut arcs = Vec::new();
        while let Some(c) = cur {
            chain.push(c);
            cur = c.parent.as_deref();
            if let Some(p) = c.parent.clone() {
                arcs.push(p);
            }
        }
        for c in chain {
            for key in c.fields.read().expect("config lock poisoned").keys() {
                seen.entry(key.clone()).or_insert(());
            }
        }
        drop(arcs);
        seen.into_keys().collect()
    }
}
