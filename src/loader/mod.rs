// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Loads and evaluates build scripts.
//!
//! A build script is a Rhai program evaluated with an injected API object
//! (`hancho`) exposing `load`/`repo`/`root`/`task`. Already-loaded scripts
//! are cached by their canonicalized path so a diamond-shaped `load()` graph
//! evaluates each file once, mirroring the original engine's module cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use rhai::{Dynamic, Engine, Scope};

use crate::config::Config;
use crate::error::{LoaderError, Result};
use crate::task::{Promise, Task};
use crate::value::Value;

/// One task declaration captured from a build script, before it is turned
/// into a [`Task`] by the scheduler (which needs the engine path and the
/// resolved promises of any dependency tasks referenced by name).
pub struct DeclaredTask {
    pub name: String,
    pub config: Arc<Config>,
    pub depends_on: Vec<String>,
}

struct LoaderState {
    root_dir: PathBuf,
    repo_dir: PathBuf,
    loaded: Mutex<HashMap<PathBuf, ()>>,
    declared: Mutex<Vec<DeclaredTask>>,
}

/// Loads build scripts and accumulates the declared task graph.
pub struct Loader {
    state: Arc<LoaderState>,
    engine_path: PathBuf,
}

impl Loader {
    #[must_use]
    pub fn new(root_dir: PathBuf, engine_path: PathBuf) -> Self {
        let repo_dir = root_dir.clone();
        Self {
            state: Arc::new(LoaderState {
                root_dir,
                repo_dir,
                loaded: Mutex::new(HashMap::new()),
                declared: Mutex::new(Vec::new()),
            }),
            engine_path,
        }
    }

    #[must_use]
    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }

    /// Loads `path` as the root build script.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::NotFound`] if the file doesn't exist, or
    /// [`LoaderError::ScriptError`] if Rhai fails to parse or run it.
    pub fn load_root(&self, path: &Path, root_config: Arc<Config>) -> Result<()> {
        self.load_script(path, root_config)
    }

    fn load_script(&self, path: &Path, parent_config: Arc<Config>) -> Result<()> {
        let canon = path.canonicalize().map_err(|_| LoaderError::NotFound(path.display().to_string()))?;
        {
            let mut loaded = self.state.loaded.lock().expect("loader lock poisoned");
            if loaded.contains_key(&canon) {
                return Ok(());
            }
            loaded.insert(canon.clone(), ());
        }

        let source = std::fs::read_to_string(&canon).map_err(|e| LoaderError::ScriptError {
            path: canon.display().to_string(),
            message: e.to_string(),
        })?;

        let script_dir = canon.parent().unwrap_or(Path::new(".")).to_path_buf();
        let script_config = Arc::new(parent_config.fork());
        script_config.set("mod_dir", script_dir.to_string_lossy().into_owned());

        let mut engine = Engine::new();
        register_api(&mut engine, Arc::clone(&self.state), Arc::clone(&script_config), script_dir);

        let mut scope = Scope::new();
        engine
            .run_with_scope(&mut scope, &source)
            .map_err(|e| LoaderError::ScriptError {
                path: canon.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Drains every task declared so far by loaded scripts.
    #[must_use]
    pub fn take_declared(&self) -> Vec<DeclaredTask> {
        std::mem::take(&mut self.state.declared.lock().expect("loader lock poisoned"))
    }
}

fn register_api(engine: &mut Engine, state: Arc<LoaderState>, config: Arc<Config>, script_dir: PathBuf) {
    let load_state = Arc::clone(&state);
    let load_config = Arc::clone(&config);
    let load_dir = script_dir.clone();
    engine.register_fn("load", move |rel: &str| -> Dynamic {
        let target = load_dir.join(rel);
        // Errors during a nested load are surfaced as a Rhai runtime error
        // by panicking the closure's Result into a string; Rhai surfaces
        // that as a script evaluation failure the outer call reports.
        let sub_loader = Loader {
            state: Arc::clone(&load_state),
            engine_path: target.clone(),
        };
        if let Err(e) = sub_loader.load_script(&target, Arc::clone(&load_config)) {
            return Dynamic::from(format!("load error: {e}"));
        }
        Dynamic::UNIT
    });

    let root_dir = state.root_dir.clone();
    engine.register_fn("root", move |rel: &str| -> String {
        root_dir.join(rel).to_string_lossy().into_owned()
    });

    let repo_dir = state.repo_dir.clone();
    engine.register_fn("repo", move |rel: &str| -> String {
        repo_dir.join(rel).to_string_lossy().into_owned()
    });

    let task_state = Arc::clone(&state);
    let task_config = Arc::clone(&config);
    engine.register_fn("task", move |name: &str, command: &str| -> Dynamic {
        declare_task(&task_state, &task_config, name, command, Vec::new(), rhai::Map::new());
        Dynamic::UNIT
    });

    let task_state = Arc::clone(&state);
    let task_config = Arc::clone(&config);
    engine.register_fn("task", move |name: &str, command: &str, options: rhai::Map| -> Dynamic {
        let mut options = options;
        let depends_on = options
            .remove("deps")
            .and_then(|d| d.into_array().ok())
            .map(|arr| arr.into_iter().filter_map(|v| v.into_string().ok()).collect())
            .unwrap_or_default();
        declare_task(&task_state, &task_config, name, command, depends_on, options);
        Dynamic::UNIT
    });
}

/// Forks `config` for a new task and records its declaration: `command` plus
/// any `deps` and arbitrary `in_*`/`out_*`/config fields passed in `options`
/// (a Rhai map literal — `#{"out_obj": "main.o", "deps": ["compile"]}`).
fn declare_task(
    state: &Arc<LoaderState>,
    config: &Arc<Config>,
    name: &str,
    command: &str,
    depends_on: Vec<String>,
    options: rhai::Map,
) {
    let cfg = Arc::new(config.fork());
    cfg.set("command", command);
    for (key, value) in options {
        cfg.set(key.to_string(), dynamic_to_value(&value));
    }
    state
        .declared
        .lock()
        .expect("loader lock poisoned")
        .push(DeclaredTask {
            name: name.to_string(),
            config: cfg,
            depends_on,
        });
}

/// Converts a Rhai dynamic value (as found in a `task()` options map) into
/// our own [`Value`], recursing into arrays/maps.
fn dynamic_to_value(d: &Dynamic) -> Value {
    if d.is_unit() {
        Value::Null
    } else if d.is::<bool>() {
        Value::Bool(d.as_bool().unwrap_or_default())
    } else if d.is::<i64>() {
        Value::Int(d.as_int().unwrap_or_default())
    } else if d.is::<f64>() {
        Value::Float(d.as_float().unwrap_or_default())
    } else if d.is::<rhai::Array>() {
        let arr = d.clone().cast::<rhai::Array>();
        Value::List(arr.iter().map(dynamic_to_value).collect())
    } else if d.is::<rhai::Map>() {
        let map = d.clone().cast::<rhai::Map>();
        Value::Map(map.into_iter().map(|(k, v)| (k.to_string(), dynamic_to_value(&v))).collect::<IndexMap<_, _>>())
    } else if let Ok(s) = d.clone().into_string() {
        Value::Str(s)
    } else {
        Value::Str(d.to_string())
    }
}

/// Resolves a declared task's dependency names into live promises, looking
/// them up in `by_name`.
///
/// # Errors
///
/// Returns an error if a dependency name doesn't match any already-declared
/// task (forward references between tasks are not supported: build scripts
/// must declare dependencies before dependents, mirroring the original
/// engine's eager, declaration-order graph construction).
pub fn resolve_dependencies(
    declared: &DeclaredTask,
    by_name: &HashMap<String, Promise>,
) -> Result<Vec<Promise>> {
    declared
        .depends_on
        .iter()
        .map(|dep| {
            by_name
                .get(dep)
                .cloned()
                .ok_or_else(|| crate::task::not_found(dep.clone()).into())
        })
        .collect()
}

/// Builds a [`Task`] from a [`DeclaredTask`] plus its resolved promises.
#[must_use]
pub fn build_task(declared: DeclaredTask, promises: Vec<Promise>, engine_path: PathBuf) -> Task {
    Task::declare(declared.name, declared.config, promises, engine_path)
}
