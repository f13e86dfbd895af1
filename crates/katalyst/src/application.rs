//! `Application` bootstrap: wires the Type Scanner's manifest through the
//! Validator, the Container, the Migration Runner, and feature `on_ready`
//! hooks in the startup order spec §2 lays out: `Scanner → Graph →
//! Validator → Container → Feature hooks → Migration Runner →
//! Scheduler/EventBus ready`. "Feature hooks" there is each feature's
//! `provide_modules()` contribution, folded into `Container::build` itself;
//! "Scheduler/EventBus ready" is `on_ready`, which runs after migrations so
//! any background loop a feature starts sees an already-migrated schema.

use std::sync::Arc;

use anyhow::Context;

use katalyst_di::container::{Container, Feature};
use katalyst_di::descriptor::ComponentManifest;
use katalyst_migrations::migration::Migration;
use katalyst_migrations::runner::{MigrationRunner, RunOutcome, RunnerConfig};

/// Migrations to run during bootstrap, plus the runner and configuration
/// to run them with. Omitted entirely when an embedding application has no
/// schema of its own to migrate.
pub struct MigrationPlan {
    pub runner: Arc<MigrationRunner>,
    pub migrations: Vec<Migration>,
    pub config: RunnerConfig,
}

/// Summary of a completed bootstrap, returned alongside the live
/// [`Application`] for startup logging/diagnostics.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub component_count: usize,
    pub features_ready: usize,
    pub migration_outcome: Option<RunOutcome>,
}

/// A running Katalyst application: a built [`Container`] plus the features
/// that were wired into it, kept around so `shutdown` can unwind both.
pub struct Application {
    container: Container,
    features: Vec<Arc<dyn Feature>>,
    pub report: BootstrapReport,
}

impl Application {
    /// Runs the full startup sequence. Every step's typed error is folded
    /// into `anyhow::Error` here, at the outermost bootstrap call site, so
    /// embedders get one consolidated failure to log and exit on rather
    /// than matching on each subsystem's error type individually.
    pub async fn bootstrap(
        manifest: &ComponentManifest,
        features: Vec<Arc<dyn Feature>>,
        migrations: Option<MigrationPlan>,
    ) -> anyhow::Result<Self> {
        let container = Container::build(manifest, &features).context("failed to build component container")?;
        let component_count = container.component_count();
        tracing::info!(component_count, "container built");

        let migration_outcome = match migrations {
            Some(plan) => {
                let outcome = plan
                    .runner
                    .run(&plan.migrations, &plan.config)
                    .await
                    .context("migration run failed")?;
                tracing::info!(
                    baselined = outcome.baselined,
                    executed = outcome.executed,
                    skipped = outcome.skipped,
                    failed = outcome.failed.len(),
                    "migrations applied"
                );
                Some(outcome)
            }
            None => None,
        };

        container.ready(&features).await.context("a feature failed to come ready")?;
        tracing::info!(feature_count = features.len(), "features ready");

        let report = BootstrapReport {
            component_count,
            features_ready: features.len(),
            migration_outcome,
        };

        Ok(Self {
            container,
            features,
            report,
        })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Shuts every component down in reverse topological order. Features
    /// themselves have no shutdown hook (spec §4.4 only names `onReady`);
    /// anything a feature started in `on_ready` is expected to register its
    /// own component with a close hook if it needs an orderly stop.
    pub fn shutdown(&self) {
        tracing::info!("shutting down application");
        self.container.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use katalyst_di::container::FeatureError;
    use katalyst_di::descriptor::ComponentBuilder;
    use katalyst_migrations::history::InMemoryHistoryStore;

    use super::*;

    struct Greeter {
        message: String,
    }

    fn manifest_with_greeter() -> ComponentManifest {
        let mut manifest = ComponentManifest::new();
        manifest.register(ComponentBuilder::new::<Greeter>().build(|_ctx| {
            Ok(Box::new(Greeter {
                message: "hello".to_string(),
            }))
        }));
        manifest
    }

    struct ReadyFlagFeature {
        ready: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Feature for ReadyFlagFeature {
        fn id(&self) -> &str {
            "ready-flag"
        }

        async fn on_ready(&self, container: &Container) -> Result<(), FeatureError> {
            assert!(container.get::<Greeter>().is_some());
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn bootstrap_builds_container_and_runs_feature_hooks_without_migrations() {
        let manifest = manifest_with_greeter();
        let ready = Arc::new(AtomicBool::new(false));
        let features: Vec<Arc<dyn Feature>> = vec![Arc::new(ReadyFlagFeature { ready: ready.clone() })];

        let app = Application::bootstrap(&manifest, features, None).await.unwrap();

        assert!(ready.load(Ordering::SeqCst));
        assert_eq!(app.report.component_count, 1);
        assert_eq!(app.report.features_ready, 1);
        assert!(app.report.migration_outcome.is_none());
        assert_eq!(app.container().get::<Greeter>().unwrap().message, "hello");
    }

    #[tokio::test]
    async fn bootstrap_runs_migrations_before_features_come_ready() {
        let manifest = manifest_with_greeter();
        let history = Arc::new(InMemoryHistoryStore::default());
        let runner = Arc::new(MigrationRunner::new(history));
        let migration = Migration::new(
            "m1",
            &["create table t (id int)"],
            Arc::new(|| async { Ok(()) }),
        );

        let plan = MigrationPlan {
            runner,
            migrations: vec![migration],
            config: RunnerConfig::default(),
        };

        let app = Application::bootstrap(&manifest, Vec::new(), Some(plan)).await.unwrap();

        let outcome = app.report.migration_outcome.as_ref().unwrap();
        assert_eq!(outcome.executed, vec!["m1".to_string()]);
    }
}
