//! Katalyst: DI container, transactional event bus, coroutine-based
//! scheduler, migration runner, and durable workflow/saga engine.
//!
//! This crate is the umbrella over the subsystem crates: it only adds
//! [`application::Application::bootstrap`], the startup sequencing the
//! other crates don't know about each other to perform themselves, plus an
//! optional [`telemetry`] installer. Everything else is re-exported through
//! [`prelude`].

pub mod application;
pub mod telemetry;

pub use katalyst_contracts as contracts;
pub use katalyst_di as di;
pub use katalyst_events as events;
pub use katalyst_migrations as migrations;
pub use katalyst_scheduler as scheduler;
pub use katalyst_workflow as workflow;

pub mod prelude {
    pub use crate::application::{Application, BootstrapReport, MigrationPlan};
    pub use crate::telemetry::{init_telemetry, TelemetryConfig};

    pub use katalyst_contracts::{
        substitute_variables, CompositeConfigProvider, ConfigError, ConfigProvider, ConfigValidator, HostError,
        IsolationLevel, MapConfigProvider, Repository, TransactionHandle, TransactionHost,
    };
    pub use katalyst_contracts::{Backoff, RetryPolicy};

    pub use katalyst_di::prelude::*;
    pub use katalyst_events::prelude::*;
    pub use katalyst_migrations::prelude::*;
    pub use katalyst_scheduler::prelude::*;
    pub use katalyst_workflow::prelude::*;
}
