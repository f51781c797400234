//! The recipe wrapper: mtime-based freshness checks and clean-mode removal
//! around a recipe body.
//!
//! Target/check/temp roles are bound to already-known role values passed
//! explicitly via [`RecipeSpec`], rather than discovered by reflecting on
//! a wrapped function's parameter names. `RecipeContext` is an explicit,
//! clonable handle onto the shared cleaning flag and temp file list.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use std::future::Future;

use crate::error::{BakeryError, Result};
use crate::joblog::JobLog;
use crate::value::Value;

/// The value bound to a single target/check/temp role. A role may be bound
/// to one path (`Scalar`) or several (`Seq`) — mirrors whether the
/// corresponding Python argument was a plain string or an iterable.
#[derive(Clone, Debug)]
pub enum RoleValue {
    Scalar(String),
    Seq(Vec<String>),
}

impl From<&str> for RoleValue {
    fn from(s: &str) -> Self {
        RoleValue::Scalar(s.to_string())
    }
}

impl From<String> for RoleValue {
    fn from(s: String) -> Self {
        RoleValue::Scalar(s)
    }
}

impl From<Vec<String>> for RoleValue {
    fn from(v: Vec<String>) -> Self {
        RoleValue::Seq(v)
    }
}

/// Flattens a role's bound argument(s) down to the file paths it names.
/// Exposed for recipe libraries that need the same flattening `recipe()`
/// applies internally to build an argv from a target/check role's value.
pub fn flatten_role(role: &RoleValue) -> Vec<String> {
    match role {
        RoleValue::Scalar(s) => vec![s.clone()],
        RoleValue::Seq(items) => items.clone(),
    }
}

fn flatten_roles(roles: &[RoleValue]) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for role in roles {
        match role {
            RoleValue::Scalar(s) => {
                set.insert(s.clone());
            }
            RoleValue::Seq(items) => set.extend(items.iter().cloned()),
        }
    }
    set
}

/// Like `flatten_roles`, but preserves first-seen declaration order instead
/// of sorting — used for the coalesced multi-target return, where caller
/// order (e.g. link order of a set of object files) can be significant.
fn flatten_roles_ordered(roles: &[RoleValue]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut ordered = Vec::new();
    for role in roles {
        for file in flatten_role(role) {
            if seen.insert(file.clone()) {
                ordered.push(file);
            }
        }
    }
    ordered
}

/// Declares the shape of a single recipe invocation: which role each
/// argument plays, its display name, and its verbosity.
#[derive(Clone, Debug, Default)]
pub struct RecipeSpec {
    pub name: Option<String>,
    pub targets: Vec<RoleValue>,
    pub check: Vec<RoleValue>,
    pub temp: Vec<RoleValue>,
    pub verbose: bool,
}

impl RecipeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        RecipeSpec {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn target(mut self, value: impl Into<RoleValue>) -> Self {
        self.targets.push(value.into());
        self
    }

    pub fn check(mut self, value: impl Into<RoleValue>) -> Self {
        self.check.push(value.into());
        self
    }

    pub fn temp(mut self, value: impl Into<RoleValue>) -> Self {
        self.temp.push(value.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Shared build-wide state a recipe invocation consults: whether we're in
/// clean mode, and the running registry of temp files to remove once the
/// build finishes.
#[derive(Clone, Default)]
pub struct RecipeContext {
    cleaning: Arc<AtomicBool>,
    temp_files: Arc<Mutex<Vec<String>>>,
}

impl RecipeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cleaning(&self, cleaning: bool) {
        self.cleaning.store(cleaning, Ordering::SeqCst);
    }

    pub fn is_cleaning(&self) -> bool {
        self.cleaning.load(Ordering::SeqCst)
    }

    /// The flag recipes and `bakery-noclean` resources both consult, shared
    /// with the [`crate::injector::Injector`] constructed alongside this
    /// context so neither needs a separate signalling path.
    pub fn cleaning_flag(&self) -> Arc<AtomicBool> {
        self.cleaning.clone()
    }

    fn register_temp(&self, files: &BTreeSet<String>) {
        self.temp_files.lock().unwrap().extend(files.iter().cloned());
    }

    /// Registers files already known to be temp outputs, bypassing the
    /// role-flattening `register_temp` does for a single recipe invocation.
    /// Used by the façade to record the files behind a whole `bakery-temp`
    /// resource once the evaluator has resolved it.
    pub fn register_raw_temp(&self, files: impl IntoIterator<Item = String>) {
        self.temp_files.lock().unwrap().extend(files);
    }

    fn drain_temp_files(&self) -> Vec<String> {
        std::mem::take(&mut *self.temp_files.lock().unwrap())
    }

    /// Removes every temp file registered by recipes run so far. Runs
    /// unconditionally after a build, success or failure.
    pub fn cleanup(&self) {
        let log = JobLog::new(Some("cleanup"));
        for file in self.drain_temp_files() {
            if let Err(err) = remove_path(&file) {
                log.warning(format!("failed to remove \"{file}\": {err}"));
            }
        }
    }
}

fn remove_path(path: &str) -> std::io::Result<()> {
    let path = Path::new(path);
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    }
}

fn mtimes(files: &BTreeSet<String>) -> Vec<SystemTime> {
    files
        .iter()
        .filter_map(|f| fs::metadata(f).and_then(|m| m.modified()).ok())
        .collect()
}

/// Runs `body` through the recipe wrapper: skips it if outputs are already
/// fresh relative to `check`, runs it and validates its outputs otherwise,
/// or removes the outputs instead of running it when `ctx` is cleaning.
pub async fn recipe<F, Fut>(ctx: &RecipeContext, spec: RecipeSpec, body: F) -> Result<Value>
where
    F: FnOnce(JobLog) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let target_files = flatten_roles(&spec.targets);
    let check_files = flatten_roles(&spec.check);
    let temp_files = flatten_roles(&spec.temp);
    let output_files: BTreeSet<String> = target_files.union(&temp_files).cloned().collect();
    let has_output_roles = !spec.targets.is_empty() || !spec.temp.is_empty();

    // Declaration-ordered view of the same output set, targets before temp,
    // for the coalesced multi-target return — `output_files` itself is a
    // `BTreeSet` and would silently re-sort a caller's intended file order.
    let output_files_ordered: Vec<String> = {
        let mut ordered = flatten_roles_ordered(&spec.targets);
        let mut seen: BTreeSet<String> = ordered.iter().cloned().collect();
        for file in flatten_roles_ordered(&spec.temp) {
            if seen.insert(file.clone()) {
                ordered.push(file);
            }
        }
        ordered
    };

    let recipe_name = spec.name.clone().unwrap_or_else(|| "recipe".to_string());
    let mut long_name = recipe_name.clone();
    if spec.verbose && (!check_files.is_empty() || !output_files.is_empty()) {
        let list = if !check_files.is_empty() { &check_files } else { &output_files };
        let joined = list.iter().cloned().collect::<Vec<_>>().join(",");
        long_name = format!("{recipe_name} {joined}");
    }
    let log = JobLog::new(Some(&long_name));

    if std::env::var("BAKERY_DEBUG").is_ok() {
        log.trace(format!("Recipe {recipe_name} invoked"));
    }

    let outputs_exist = || output_files.iter().all(|f| Path::new(f).exists());

    let outputs_up_to_date = || -> bool {
        if !has_output_roles || !outputs_exist() {
            return false;
        }
        if check_files.is_empty() {
            return true;
        }
        let check_m = mtimes(&check_files);
        let output_m = mtimes(&output_files);
        match (check_m.iter().max(), output_m.iter().max()) {
            (Some(c), Some(o)) => c <= o,
            _ => false,
        }
    };

    let coalesce_default_outputs = || -> Value {
        if let [RoleValue::Scalar(s)] = spec.targets.as_slice() {
            return Value::scalar(s.clone());
        }
        Value::Seq(output_files_ordered.iter().cloned().map(Value::Scalar).collect())
    };

    if ctx.is_cleaning() {
        if outputs_exist() {
            log.trace("Cleaning...");
            for file in &output_files {
                remove_path(file)?;
            }
        }
        return Ok(coalesce_default_outputs());
    }

    if outputs_up_to_date() {
        return Ok(coalesce_default_outputs());
    }

    let result = body(log.clone()).await?;
    ctx.register_temp(&temp_files);

    if !outputs_up_to_date() {
        let missing: Vec<PathBuf> = output_files
            .iter()
            .filter(|f| !Path::new(f).exists())
            .map(PathBuf::from)
            .collect();
        return Err(BakeryError::RecipeOutputMissing {
            recipe: recipe_name,
            missing,
            checked: check_files.iter().map(PathBuf::from).collect(),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn skip_path_coalesces_multiple_targets_in_declared_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("z_first.o");
        let second = dir.path().join("a_second.o");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let ctx = RecipeContext::new();
        let spec = RecipeSpec::new("archive")
            .target(first.to_str().unwrap())
            .target(second.to_str().unwrap());
        let result = recipe(&ctx, spec, |_log| async {
            panic!("outputs already exist; body must not run");
            #[allow(unreachable_code)]
            Ok(Value::scalar("unused"))
        })
        .await
        .unwrap();

        match result {
            Value::Seq(items) => {
                let paths: Vec<String> = items
                    .into_iter()
                    .map(|v| match v {
                        Value::Scalar(s) => s,
                        _ => panic!("expected scalar elements"),
                    })
                    .collect();
                assert_eq!(
                    paths,
                    vec![
                        first.to_str().unwrap().to_string(),
                        second.to_str().unwrap().to_string(),
                    ],
                    "declared target order must survive the skip path, not be alphabetized"
                );
            }
            _ => panic!("expected a sequence of output paths"),
        }
    }

    #[tokio::test]
    async fn freshly_run_producer_result_passes_through_verbatim() {
        // the wrapper only computes a coalesced return for the clean and
        // up-to-date-skip branches; a freshly run producer's own return
        // value is what callers see unchanged. By convention a recipe
        // returns its own target path (see recipes::c::compile).
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let ctx = RecipeContext::new();
        let spec = RecipeSpec::new("touch").target(out.to_str().unwrap());
        let out_clone = out.clone();
        let result = recipe(&ctx, spec, |_log| async move {
            fs::write(&out_clone, b"hi").unwrap();
            Ok(Value::scalar(out_clone.to_str().unwrap().to_string()))
        })
        .await
        .unwrap();
        match result {
            Value::Scalar(s) => assert_eq!(s, out.to_str().unwrap()),
            _ => panic!("expected scalar"),
        }
    }

    #[tokio::test]
    async fn skips_body_when_output_is_fresher_than_check() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.c");
        let out = dir.path().join("out.o");
        fs::write(&src, b"src").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(&out, b"out").unwrap();

        let ctx = RecipeContext::new();
        let spec = RecipeSpec::new("compile")
            .target(out.to_str().unwrap())
            .check(src.to_str().unwrap());

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let result = recipe(&ctx, spec, move |_log| async move {
            ran_clone.store(true, Ordering::SeqCst);
            Ok(Value::scalar("never"))
        })
        .await
        .unwrap();

        assert!(!ran.load(Ordering::SeqCst), "producer must not run when outputs are fresh");
        match result {
            Value::Scalar(s) => assert_eq!(s, out.to_str().unwrap()),
            _ => panic!("expected coalesced scalar"),
        }
    }

    #[tokio::test]
    async fn missing_output_after_body_runs_is_an_error() {
        let ctx = RecipeContext::new();
        let spec = RecipeSpec::new("broken").target("/nonexistent/path/out.bin");
        let err = recipe(&ctx, spec, |_log| async { Ok(Value::scalar("noop")) })
            .await
            .unwrap_err();
        assert!(matches!(err, BakeryError::RecipeOutputMissing { .. }));
    }

    #[tokio::test]
    async fn cleaning_removes_outputs_without_running_body() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.bin");
        fs::write(&out, b"data").unwrap();

        let ctx = RecipeContext::new();
        ctx.set_cleaning(true);
        let spec = RecipeSpec::new("compile").target(out.to_str().unwrap());
        recipe(&ctx, spec, |_log| async {
            panic!("body must not run while cleaning");
            #[allow(unreachable_code)]
            Ok(Value::scalar("x"))
        })
        .await
        .unwrap();
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn temp_files_are_registered_and_cleaned_up() {
        let dir = tempdir().unwrap();
        let tmp = dir.path().join("scratch.tmp");
        let out = dir.path().join("final.bin");
        let tmp_clone = tmp.clone();
        let out_clone = out.clone();

        let ctx = RecipeContext::new();
        let spec = RecipeSpec::new("link")
            .target(out.to_str().unwrap())
            .temp(tmp.to_str().unwrap());
        recipe(&ctx, spec, move |_log| async move {
            fs::write(&tmp_clone, b"scratch").unwrap();
            fs::write(&out_clone, b"final").unwrap();
            Ok(Value::scalar("unused"))
        })
        .await
        .unwrap();

        assert!(tmp.exists());
        ctx.cleanup();
        assert!(!tmp.exists());
    }
}
