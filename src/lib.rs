//! Aggregated trace-sales table engine.
//!
//! Loads grouped sales records from the account-linker Apex REST service,
//! filters, pages and selects them in memory, and links or unlinks the
//! selection to a business account. When the service cannot aggregate
//! synchronously, a remote batch job is started and polled to completion
//! before the load is re-issued.

pub mod config;
pub mod controller;
pub mod error;
pub mod salesforce;
pub mod table;

pub use config::LinkerConfig;
pub use controller::{
    ChannelNotifier, DataSource, Notification, Notifier, NullNotifier, SelectAllState, Severity,
    TableController, TableView, VisibleRow,
};
pub use error::{AppError, ErrorCategory, ErrorPresentation};
pub use salesforce::{ApexLinkerClient, LinkerBackend, OrgCredentials, SalesforceClient};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Builds a controller talking to the Apex REST service of `creds`' org.
pub fn connect<N: Notifier>(
    creds: OrgCredentials,
    config: LinkerConfig,
    notifier: N,
) -> Result<TableController<ApexLinkerClient, N>, AppError> {
    config.validate()?;
    let client = SalesforceClient::new(creds, config.request_timeout())?
        .with_logging_mode(config.logging_mode());
    let backend = ApexLinkerClient::new(client, &config);
    tracing::info!("[CONFIG] Controller ready (page size {})", config.default_page_size);
    Ok(TableController::new(backend, notifier, config))
}
