//! The top-level driver: resolves targets through the injector, runs setup
//! resources first, and (in clean mode) walks the dependency graph so
//! intermediate targets get a chance to clean their own outputs too.
//!
//! Splicing lives in `value::splice` and runs inline as part of
//! `Injector::require`, so this module is just the setup / targets /
//! clean-walk orchestration, plus resolving whole-resource `temp` targets
//! before the façade's final cleanup.

use std::collections::HashMap;

use futures_util::future::try_join_all;

use crate::attributes::Attributes;
use crate::error::{BakeryError, Result};
use crate::injector::Injector;
use crate::value::Concrete;

pub struct Evaluator<'a> {
    injector: &'a Injector,
}

impl<'a> Evaluator<'a> {
    pub fn new(injector: &'a Injector) -> Self {
        Evaluator { injector }
    }

    fn targets(&self) -> Vec<(String, Attributes)> {
        self.injector.scan(|_, attrs| attrs.is_target())
    }

    fn default_target(&self) -> Result<Option<String>> {
        let defaults: Vec<_> = self
            .injector
            .scan(|_, attrs| attrs.is_default())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        match defaults.len() {
            0 => Ok(None),
            1 => Ok(Some(defaults[0].clone())),
            _ => Err(BakeryError::TargetConflict(defaults)),
        }
    }

    /// Picks the requested targets (or the lone default) and confirms every
    /// one of them is a known `bakery-target`. Exposed at crate visibility
    /// so the façade's `-n`/`-e` plan printing can resolve the same target
    /// set the evaluator itself would build.
    pub(crate) fn resolve_requested(&self, requested: &[String]) -> Result<Vec<String>> {
        let valid: std::collections::HashSet<String> =
            self.targets().into_iter().map(|(name, _)| name).collect();

        let targets = if requested.is_empty() {
            let default = self.default_target()?.ok_or_else(|| {
                BakeryError::Internal(
                    "no target was specified and no default target was defined".into(),
                )
            })?;
            vec![default]
        } else {
            requested.to_vec()
        };

        for target in &targets {
            if !valid.contains(target) {
                return Err(BakeryError::UnknownTarget(target.clone()));
            }
        }
        Ok(targets)
    }

    /// Resolves setup resources, then the requested targets, then (in clean
    /// mode) the full dependency closure. Temp-file removal is the façade's
    /// job, since the temp registry is shared state the façade owns, not
    /// the evaluator.
    pub async fn build(
        &self,
        requested: &[String],
        clean: bool,
    ) -> Result<HashMap<String, Concrete>> {
        let targets = self.resolve_requested(requested)?;

        let setups = self.injector.scan(|_, attrs| attrs.is_setup());
        try_join_all(setups.iter().map(|(name, _)| self.injector.require(name))).await?;

        let mut results = HashMap::new();
        for target in &targets {
            let value = self.injector.require(target).await?;
            results.insert(target.clone(), value);
        }

        if clean {
            let valid: std::collections::HashSet<String> =
                self.targets().into_iter().map(|(name, _)| name).collect();
            let graph = self.injector.dependency_graph(&targets)?;
            let to_clean: Vec<&String> = graph.keys().filter(|dep| valid.contains(*dep)).collect();
            try_join_all(to_clean.into_iter().map(|dep| self.injector.require(dep))).await?;
        }

        Ok(results)
    }

    /// Resolves every resource marked `bakery-temp` that's reachable from
    /// `targets`'s dependency closure (the façade's whole-resource temp
    /// marker, distinct from a recipe's own `temp=` role) and flattens each
    /// into its file paths. A `bakery-temp` resource belonging to some
    /// other, unrequested target is left untouched — and unbuilt — rather
    /// than forced to resolve just to populate the temp registry.
    pub async fn resolve_temp_resources(&self, targets: &[String]) -> Result<Vec<String>> {
        let graph = self.injector.dependency_graph(targets)?;
        let temps = self.injector.scan(|_, attrs| attrs.is_temp());
        let mut files = Vec::new();
        for (name, _) in temps {
            if !graph.contains_key(&name) {
                continue;
            }
            let value = self.injector.require(&name).await?;
            files.extend(value.flatten());
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{DEFAULT, SETUP, SINGLETON, TARGET};
    use crate::injector::{Module, Resource};
    use crate::value::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct DemoModule {
        setup_runs: Arc<AtomicU32>,
    }

    impl Module for DemoModule {
        fn resources(&self) -> Vec<Resource> {
            let setup_runs = self.setup_runs.clone();
            vec![
                Resource::new(
                    "prep",
                    Attributes::new().with(SETUP).with(SINGLETON),
                    vec![],
                    Arc::new(move |_| {
                        let setup_runs = setup_runs.clone();
                        Box::pin(async move {
                            setup_runs.fetch_add(1, Ordering::SeqCst);
                            Ok(Value::scalar("ready"))
                        })
                    }),
                ),
                Resource::new(
                    "out",
                    Attributes::new().with(TARGET).with(DEFAULT),
                    vec![],
                    Arc::new(|_| Box::pin(async { Ok(Value::scalar("out.bin")) })),
                ),
            ]
        }
    }

    #[tokio::test]
    async fn runs_setup_before_targets_and_defaults_when_unspecified() {
        let setup_runs = Arc::new(AtomicU32::new(0));
        let mut injector = Injector::new();
        injector.register(&DemoModule {
            setup_runs: setup_runs.clone(),
        });
        let evaluator = Evaluator::new(&injector);
        let result = evaluator.build(&[], false).await.unwrap();
        assert_eq!(setup_runs.load(Ordering::SeqCst), 1);
        assert_eq!(result["out"], Concrete::Scalar("out.bin".into()));
    }

    #[tokio::test]
    async fn unknown_requested_target_errors() {
        let injector = Injector::new();
        let evaluator = Evaluator::new(&injector);
        let err = evaluator
            .build(&["nope".to_string()], false)
            .await
            .unwrap_err();
        assert!(matches!(err, BakeryError::UnknownTarget(_)));
    }

    struct ConflictingDefaultsModule;
    impl Module for ConflictingDefaultsModule {
        fn resources(&self) -> Vec<Resource> {
            vec![
                Resource::new(
                    "a",
                    Attributes::new().with(TARGET).with(DEFAULT),
                    vec![],
                    Arc::new(|_| Box::pin(async { Ok(Value::scalar("a")) })),
                ),
                Resource::new(
                    "b",
                    Attributes::new().with(TARGET).with(DEFAULT),
                    vec![],
                    Arc::new(|_| Box::pin(async { Ok(Value::scalar("b")) })),
                ),
            ]
        }
    }

    #[tokio::test]
    async fn duplicate_defaults_conflict_before_any_producer_runs() {
        let mut injector = Injector::new();
        injector.register(&ConflictingDefaultsModule);
        let evaluator = Evaluator::new(&injector);
        let err = evaluator.build(&[], false).await.unwrap_err();
        assert!(matches!(err, BakeryError::TargetConflict(_)));
    }

    struct TwoIndependentTargetsModule {
        unrelated_temp_runs: Arc<AtomicU32>,
    }

    impl Module for TwoIndependentTargetsModule {
        fn resources(&self) -> Vec<Resource> {
            let unrelated_temp_runs = self.unrelated_temp_runs.clone();
            vec![
                Resource::new(
                    "wanted",
                    Attributes::new().with(TARGET).with(SINGLETON),
                    vec![],
                    Arc::new(|_| Box::pin(async { Ok(Value::scalar("wanted.bin")) })),
                ),
                Resource::new(
                    "unrelated",
                    Attributes::new().with(TARGET).with(SINGLETON),
                    vec![],
                    Arc::new(|_| Box::pin(async { Ok(Value::scalar("unrelated.bin")) })),
                ),
                Resource::new(
                    "unrelated_temp",
                    Attributes::new()
                        .with(crate::attributes::TEMP)
                        .with(SINGLETON),
                    vec![],
                    Arc::new(move |_| {
                        let unrelated_temp_runs = unrelated_temp_runs.clone();
                        Box::pin(async move {
                            unrelated_temp_runs.fetch_add(1, Ordering::SeqCst);
                            Ok(Value::scalar("unrelated.tmp"))
                        })
                    }),
                ),
            ]
        }
    }

    #[tokio::test]
    async fn resolve_temp_resources_skips_temps_outside_the_requested_closure() {
        let unrelated_temp_runs = Arc::new(AtomicU32::new(0));
        let mut injector = Injector::new();
        injector.register(&TwoIndependentTargetsModule {
            unrelated_temp_runs: unrelated_temp_runs.clone(),
        });
        let evaluator = Evaluator::new(&injector);
        let files = evaluator
            .resolve_temp_resources(&["wanted".to_string()])
            .await
            .unwrap();
        assert!(files.is_empty());
        assert_eq!(unrelated_temp_runs.load(Ordering::SeqCst), 0);
    }
}
