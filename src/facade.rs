//! The process-wide object a Rust "bakefile" builds against: registers
//! modules, binds built-in providers, and drives [`Evaluator::build`].
//! Resource attributes that other systems express as decorators
//! (`target`, `default`, `setup`, ...) become builder methods on
//! [`ResourceBuilder`] here.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::attributes::{Attributes, DEFAULT, NOCLEAN, SETUP, SINGLETON, TARGET, TEMP};
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::injector::{Dependency, Injector, Module, ParamMap, ProducerFn, Resource};
use crate::recipe::RecipeContext;
use crate::shell::{ShellOpts, ShellRunner};
use crate::value::{Concrete, Value};

/// Accumulates a single [`Resource`]'s attributes and dependencies one
/// method call at a time. `provide` (or `const_value`) finishes the builder
/// and returns the `Resource` ready for a [`Module`] to hand to the
/// injector.
#[derive(Clone)]
pub struct ResourceBuilder {
    name: String,
    attrs: Attributes,
    deps: Vec<Dependency>,
}

impl ResourceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ResourceBuilder {
            name: name.into(),
            attrs: Attributes::new(),
            deps: Vec::new(),
        }
    }

    /// A display name distinct from the resolved name, for logging.
    pub fn named(mut self, display: impl Into<String>) -> Self {
        self.attrs.display_name = Some(display.into());
        self
    }

    /// Produced at most once per build.
    pub fn singleton(mut self) -> Self {
        self.attrs = self.attrs.with(SINGLETON);
        self
    }

    /// Exposed as a user-selectable build output. Targets are implicitly
    /// singletons.
    pub fn target(mut self) -> Self {
        self.attrs = self.attrs.with(TARGET);
        self.singleton()
    }

    /// The target used when none is named on the CLI. At most one resource
    /// in a build may carry this.
    pub fn default(mut self) -> Self {
        self.attrs = self.attrs.with(DEFAULT);
        self.target()
    }

    /// Run once, before any target resolution, regardless of whether a
    /// target depends on it.
    pub fn setup(mut self) -> Self {
        self.attrs = self.attrs.with(SETUP);
        self.singleton()
    }

    /// This resource's resolved value (a path or list of paths) is appended
    /// to the temp-file registry once it has been produced.
    pub fn temp(mut self) -> Self {
        self.attrs = self.attrs.with(TEMP);
        self.singleton()
    }

    /// Skip the producer and return an empty value while the build is in
    /// clean mode, for side-effect-only resources whose contract isn't a
    /// file the clean pass can remove on its own.
    pub fn noclean(mut self) -> Self {
        self.attrs = self.attrs.with(NOCLEAN);
        self
    }

    /// Declares that the producer's `param` argument is bound to resource
    /// `resource`'s resolved value.
    pub fn inject(mut self, param: impl Into<String>, resource: impl Into<String>) -> Self {
        self.deps.push(Dependency::new(param, resource));
        self
    }

    /// Sugar for `inject` when the parameter and resource name coincide,
    /// the common case.
    pub fn using(self, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        self.inject(resource.clone(), resource)
    }

    /// Finishes the builder with an async producer.
    pub fn provide<F, Fut>(self, producer: F) -> Resource
    where
        F: Fn(ParamMap) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        let producer: ProducerFn = Arc::new(move |params| Box::pin(producer(params)));
        Resource::new(self.name, self.attrs, self.deps, producer)
    }

    /// A singleton resource whose value never changes.
    pub fn const_value(self, value: impl Into<String>) -> Resource {
        let value = value.into();
        self.singleton().provide(move |_| {
            let value = value.clone();
            async move { Ok(Value::scalar(value)) }
        })
    }
}

/// Wraps a module so every resource it contributes is registered under a
/// flat `ns::name`, and every dependency it declares on a sibling resource
/// in the same module is rewritten the same way. A dependency naming a
/// resource *outside* the namespace (or the reserved `log` sentinel) is
/// left untouched.
pub struct Namespaced<M> {
    ns: String,
    inner: M,
}

impl<M: Module> Namespaced<M> {
    pub fn new(ns: impl Into<String>, inner: M) -> Self {
        Namespaced {
            ns: ns.into(),
            inner,
        }
    }

    fn prefixed(&self, name: &str) -> String {
        format!("{}::{}", self.ns, name)
    }
}

impl<M: Module> Module for Namespaced<M> {
    fn resources(&self) -> Vec<Resource> {
        let resources = self.inner.resources();
        let inner_names: std::collections::HashSet<String> =
            resources.iter().map(|r| r.name.clone()).collect();
        resources
            .into_iter()
            .map(|mut resource| {
                resource.name = self.prefixed(&resource.name);
                for dep in resource.deps.iter_mut() {
                    if !dep.is_log() && inner_names.contains(&dep.resource) {
                        dep.resource = self.prefixed(&dep.resource);
                    }
                }
                resource
            })
            .collect()
    }
}

/// Built-in providers every build carries: the `cleaning` boolean flag.
/// `log` is never a real dependency, just the reserved sentinel excluded
/// from the graph entirely.
struct BuiltinModule {
    cleaning: Arc<std::sync::atomic::AtomicBool>,
}

impl Module for BuiltinModule {
    fn resources(&self) -> Vec<Resource> {
        let cleaning = self.cleaning.clone();
        vec![ResourceBuilder::new("cleaning")
            .singleton()
            .provide(move |_| {
                let cleaning = cleaning.clone();
                async move {
                    let flag = cleaning.load(Ordering::SeqCst);
                    Ok(Value::scalar(if flag { "true" } else { "false" }))
                }
            })]
    }
}

/// The process-wide façade a Rust bakefile constructs and drives. Binds
/// the injector, the shared clean-mode/temp-file state recipes consult,
/// and the bounded shell runner into one object.
pub struct Build {
    injector: Injector,
    ctx: RecipeContext,
    shell: Arc<ShellRunner>,
}

impl Build {
    pub fn new() -> Self {
        Self::with_shell(ShellRunner::new())
    }

    /// Constructs a façade whose shell runner has an explicit concurrency
    /// bound, for the CLI's `-j` override.
    pub fn with_jobs(jobs: usize) -> Self {
        Self::with_shell(ShellRunner::with_jobs(jobs))
    }

    fn with_shell(shell: ShellRunner) -> Self {
        let ctx = RecipeContext::new();
        let mut injector = Injector::with_cleaning_flag(ctx.cleaning_flag());
        injector.register(&BuiltinModule {
            cleaning: ctx.cleaning_flag(),
        });
        Build {
            injector,
            ctx,
            shell: Arc::new(shell),
        }
    }

    pub fn register(&mut self, module: &dyn Module) -> &mut Self {
        self.injector.register(module);
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>, resource: impl Into<String>) -> &mut Self {
        self.injector.alias(alias, resource);
        self
    }

    pub fn add_async_interceptor(&mut self, hook: crate::injector::InterceptorFn) -> &mut Self {
        self.injector.add_async_interceptor(hook);
        self
    }

    pub fn recipe_context(&self) -> &RecipeContext {
        &self.ctx
    }

    /// Resolves `requested` to the concrete target set `build()` would use:
    /// `requested` itself, or the lone `bakery-default` target when empty.
    /// Used by the CLI's `-n`/`-e` plan printing, which needs the same
    /// target resolution as `build()` without invoking any producer.
    pub fn resolve_targets(&self, requested: &[String]) -> Result<Vec<String>> {
        Evaluator::new(&self.injector).resolve_requested(requested)
    }

    /// The transitive dependency-name graph rooted at `targets`, restricted
    /// to the closure `Evaluator::build` would walk. Used by the CLI's
    /// execution-plan display to print topological levels.
    pub fn dependency_graph(
        &self,
        targets: &[String],
    ) -> Result<HashMap<String, std::collections::HashSet<String>>> {
        self.injector.dependency_graph(targets)
    }

    pub fn shell_runner(&self) -> Arc<ShellRunner> {
        self.shell.clone()
    }

    /// Delegates to the shell runner with a fresh, anonymous job log.
    pub async fn shell(&self, argv: &[String], opts: &ShellOpts) -> Result<Vec<String>> {
        let log = crate::joblog::JobLog::new(None);
        self.shell.run(argv, opts, &log).await
    }

    /// The top-level entry point: resolves `targets` (or the default),
    /// running setup resources first; in clean mode also walks the
    /// dependency graph so intermediate targets clean themselves. Temp-file
    /// removal runs in a guaranteed finalizer regardless of the build's
    /// outcome.
    pub async fn build(
        &mut self,
        targets: &[String],
        clean: bool,
    ) -> Result<HashMap<String, Concrete>> {
        self.ctx.set_cleaning(clean);
        self.injector.ensure_acyclic()?;

        let evaluator = Evaluator::new(&self.injector);
        let outcome = async {
            let resolved_targets = evaluator.resolve_requested(targets)?;
            let results = evaluator.build(targets, clean).await?;
            let temp_files = evaluator.resolve_temp_resources(&resolved_targets).await?;
            self.ctx.register_raw_temp(temp_files);
            Ok(results)
        }
        .await;

        self.ctx.cleanup();
        outcome
    }
}

impl Default for Build {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::LOG_PARAM;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering as AtOrdering};
    use tempfile::tempdir;

    struct FileModule {
        dir: std::path::PathBuf,
        compiles: Arc<AtomicU32>,
    }

    impl Module for FileModule {
        fn resources(&self) -> Vec<Resource> {
            let src = self.dir.join("a.c");
            fs::write(&src, b"int main(){return 0;}").unwrap();
            let obj = self.dir.join("a.o");
            let compiles = self.compiles.clone();

            vec![
                ResourceBuilder::new("sources")
                    .singleton()
                    .provide({
                        let src = src.clone();
                        move |_| {
                            let src = src.clone();
                            async move { Ok(Value::scalar(src.to_str().unwrap())) }
                        }
                    }),
                ResourceBuilder::new("objects")
                    .temp()
                    .inject("src", "sources")
                    .provide({
                        let obj = obj.clone();
                        move |params| {
                            let obj = obj.clone();
                            let compiles = compiles.clone();
                            let src = params["src"].as_scalar().unwrap().to_string();
                            async move {
                                compiles.fetch_add(1, AtOrdering::SeqCst);
                                fs::write(&obj, format!("compiled from {src}")).unwrap();
                                Ok(Value::scalar(obj.to_str().unwrap()))
                            }
                        }
                    }),
                ResourceBuilder::new("executable")
                    .default()
                    .inject("objects", "objects")
                    .provide(|params| async move {
                        let objects = params["objects"].as_scalar().unwrap().to_string();
                        Ok(Value::scalar(objects))
                    }),
            ]
        }
    }

    #[tokio::test]
    async fn builds_default_target_and_cleans_up_temp_resource() {
        let dir = tempdir().unwrap();
        let compiles = Arc::new(AtomicU32::new(0));
        let module = FileModule {
            dir: dir.path().to_path_buf(),
            compiles: compiles.clone(),
        };

        let mut build = Build::new();
        build.register(&module);
        let result = build.build(&[], false).await.unwrap();
        assert!(result.contains_key("executable"));
        assert_eq!(compiles.load(AtOrdering::SeqCst), 1);
        assert!(!dir.path().join("a.o").exists(), "temp object should be removed after build");
    }

    #[test]
    fn log_sentinel_is_the_reserved_param_name() {
        // the `log` sentinel never becomes an Attributes marker; it's a
        // Dependency whose is_log() excludes it from the graph entirely.
        assert_eq!(LOG_PARAM, "log");
    }
}
