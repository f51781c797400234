//! Dependency-injection graph: resources, their declared dependencies, and
//! resolution with singleton caching.
//!
//! Acyclicity and level ordering are checked with
//! `petgraph::algo::is_cyclic_directed` / `tarjan_scc`. A producer's
//! dependencies are an explicit `Dependency` list attached at registration
//! time rather than discovered by reflecting on parameter names, so
//! splicing doesn't need a separate pass to intercept pending coroutines:
//! it happens inline, as part of resolving a resource's own value.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{Graph, NodeIndex};
use tokio::sync::{Mutex, OnceCell};

use crate::attributes::Attributes;
use crate::error::{BakeryError, Result};
use crate::value::{splice, BoxFuture, Concrete, Value};

/// The reserved parameter name bound to the resource's job name at call
/// time (see `Injector::produce`) instead of being resolved through the
/// graph.
pub const LOG_PARAM: &str = "log";

#[derive(Clone, Debug)]
pub struct Dependency {
    pub param: String,
    pub resource: String,
}

impl Dependency {
    pub fn new(param: impl Into<String>, resource: impl Into<String>) -> Self {
        Dependency {
            param: param.into(),
            resource: resource.into(),
        }
    }

    /// True for the sentinel `log` dependency, which is excluded from the
    /// dependency graph and bound at call time instead.
    pub fn is_log(&self) -> bool {
        self.param == LOG_PARAM
    }
}

pub type ParamMap = HashMap<String, Concrete>;
pub type ProducerFn = Arc<dyn Fn(ParamMap) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Clone)]
pub struct Resource {
    pub name: String,
    pub attrs: Attributes,
    pub deps: Vec<Dependency>,
    producer: ProducerFn,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        attrs: Attributes,
        deps: Vec<Dependency>,
        producer: ProducerFn,
    ) -> Self {
        Resource {
            name: name.into(),
            attrs,
            deps,
            producer,
        }
    }

    /// Dependencies that participate in the graph (everything but `log`).
    pub fn graph_deps(&self) -> impl Iterator<Item = &Dependency> {
        self.deps.iter().filter(|d| !d.is_log())
    }
}

/// A module contributes a set of resources to an injector.
pub trait Module {
    fn resources(&self) -> Vec<Resource>;
}

/// Hook invoked with a resource's attributes and its resolved parameter map
/// just before the producer runs; the returned map replaces it. A general
/// extension seam for callers that need to rewrite a param map wholesale
/// (e.g. a custom injection strategy); the `log` sentinel parameter (see
/// `Dependency::is_log`) is bound directly in `Injector::produce` and
/// doesn't go through this hook.
pub type InterceptorFn = Arc<dyn Fn(&Attributes, ParamMap) -> ParamMap + Send + Sync>;

pub struct Injector {
    resources: IndexMap<String, Resource>,
    aliases: HashMap<String, String>,
    singletons: Mutex<HashMap<String, Arc<OnceCell<Concrete>>>>,
    interceptors: Vec<InterceptorFn>,
    cleaning: Arc<AtomicBool>,
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl Injector {
    pub fn new() -> Self {
        Self::with_cleaning_flag(Arc::new(AtomicBool::new(false)))
    }

    /// Shares a single cleaning-mode flag with the caller (the façade's
    /// `RecipeContext`), so a `bakery-noclean` resource can see the same
    /// flag a recipe checks without going through the dependency graph.
    pub fn with_cleaning_flag(cleaning: Arc<AtomicBool>) -> Self {
        Injector {
            resources: IndexMap::new(),
            aliases: HashMap::new(),
            singletons: Mutex::new(HashMap::new()),
            interceptors: Vec::new(),
            cleaning,
        }
    }

    fn is_cleaning(&self) -> bool {
        self.cleaning.load(Ordering::SeqCst)
    }

    pub fn register(&mut self, module: &dyn Module) {
        for resource in module.resources() {
            self.resources.insert(resource.name.clone(), resource);
        }
    }

    pub fn alias(&mut self, alias: impl Into<String>, resource: impl Into<String>) {
        self.aliases.insert(alias.into(), resource.into());
    }

    pub fn add_async_interceptor(&mut self, hook: InterceptorFn) {
        self.interceptors.push(hook);
    }

    fn resolve_name<'a>(&self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    fn lookup(&self, name: &str) -> Result<&Resource> {
        let name = self.resolve_name(name);
        self.resources
            .get(name)
            .ok_or_else(|| BakeryError::UnknownTarget(name.to_string()))
    }

    /// Verifies the registered resources form an acyclic graph, excluding
    /// the `log` sentinel parameter from edges entirely.
    pub fn ensure_acyclic(&self) -> Result<()> {
        let mut graph = Graph::<String, ()>::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for name in self.resources.keys() {
            let idx = graph.add_node(name.clone());
            indices.insert(name.as_str(), idx);
        }
        for resource in self.resources.values() {
            let from = indices[resource.name.as_str()];
            for dep in resource.graph_deps() {
                let target_name = self.resolve_name(&dep.resource);
                if let Some(&to) = indices.get(target_name) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        if is_cyclic_directed(&graph) {
            let sccs = tarjan_scc(&graph);
            let mut cycle_members = Vec::new();
            for scc in sccs {
                if scc.len() > 1 || (scc.len() == 1 && graph.find_edge(scc[0], scc[0]).is_some()) {
                    cycle_members.extend(scc.into_iter().map(|idx| graph[idx].clone()));
                }
            }
            return Err(BakeryError::Cycle(cycle_members));
        }
        Ok(())
    }

    /// Transitive dependency-name graph rooted at `roots`, used by the
    /// evaluator to build topological levels.
    pub fn dependency_graph(&self, roots: &[String]) -> Result<HashMap<String, HashSet<String>>> {
        let mut graph = HashMap::new();
        let mut stack: Vec<String> = roots.to_vec();
        while let Some(name) = stack.pop() {
            let resolved = self.resolve_name(&name).to_string();
            if graph.contains_key(&resolved) {
                continue;
            }
            let resource = self.lookup(&resolved)?;
            let deps: HashSet<String> = resource
                .graph_deps()
                .map(|d| self.resolve_name(&d.resource).to_string())
                .collect();
            for dep in &deps {
                stack.push(dep.clone());
            }
            graph.insert(resolved, deps);
        }
        Ok(graph)
    }

    /// Resources whose attributes satisfy `pred`.
    pub fn scan(&self, pred: impl Fn(&str, &Attributes) -> bool) -> Vec<(String, Attributes)> {
        self.resources
            .values()
            .filter(|r| pred(&r.name, &r.attrs))
            .map(|r| (r.name.clone(), r.attrs.clone()))
            .collect()
    }

    pub fn attrs(&self, name: &str) -> Result<Attributes> {
        Ok(self.lookup(name)?.attrs.clone())
    }

    /// Resolves `name` to a fully spliced [`Concrete`] value, producing it
    /// at most once if it's a singleton.
    pub fn require(&self, name: &str) -> BoxFuture<'_, Result<Concrete>> {
        let name = name.to_string();
        Box::pin(async move {
            let resource = self.lookup(&name)?.clone();
            if resource.attrs.is_singleton() {
                let cell = {
                    let mut singletons = self.singletons.lock().await;
                    singletons
                        .entry(resource.name.clone())
                        .or_insert_with(|| Arc::new(OnceCell::new()))
                        .clone()
                };
                let value = cell
                    .get_or_try_init(|| self.produce(&resource))
                    .await?
                    .clone();
                Ok(value)
            } else {
                self.produce(&resource).await
            }
        })
    }

    async fn produce(&self, resource: &Resource) -> Result<Concrete> {
        if resource.attrs.is_noclean() && self.is_cleaning() {
            return Ok(Concrete::Scalar(String::new()));
        }
        let mut param_map = ParamMap::new();
        for dep in &resource.deps {
            if dep.is_log() {
                // Not resolved through the graph: bound directly to the job
                // name a `crate::joblog::JobLog` for this resource would be
                // constructed with, since a `Concrete` can only carry a
                // string, not a live `JobLog` handle.
                let job_name = resource
                    .attrs
                    .display_name
                    .clone()
                    .unwrap_or_else(|| resource.name.clone());
                param_map.insert(dep.param.clone(), Concrete::Scalar(job_name));
                continue;
            }
            let value = self.require(&dep.resource).await?;
            param_map.insert(dep.param.clone(), value);
        }
        for interceptor in &self.interceptors {
            param_map = interceptor(&resource.attrs, param_map);
        }
        let raw = (resource.producer)(param_map).await?;
        splice(raw).await
    }
}
