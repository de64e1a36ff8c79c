//! Service wiring: store selection, notifier adapters, RBAC seeding.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use churchos_auth::default_plan;
use churchos_core::{Clock, SystemClock};
use churchos_infra::notifier::{Channel, LogNotifier, Notifier, WebhookNotifier};
use churchos_infra::store::{InMemoryIdentityStore, PostgresIdentityStore};
use churchos_infra::{AppConfig, IdentityServices, ServiceDeps};

/// Build all identity services for `config`.
///
/// `DATABASE_URL` selects Postgres (schema applied on connect); without it
/// everything lives in memory for the life of the process.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<IdentityServices> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    build_services_with_clock(config, clock).await
}

pub async fn build_services_with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> anyhow::Result<IdentityServices> {
    let (email, sms) = notifiers(config);
    let deps = ServiceDeps { clock, email, sms };

    let services = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresIdentityStore::connect(url)
                .await
                .context("connecting to postgres")?;
            store.apply_schema().await.context("applying identity schema")?;
            info!("using postgres identity store");
            IdentityServices::new(Arc::new(store), config, deps)?
        }
        None => {
            warn!("DATABASE_URL not set; identity data is kept in memory");
            IdentityServices::new(Arc::new(InMemoryIdentityStore::new()), config, deps)?
        }
    };

    if config.seed_rbac_on_start {
        let plan = default_plan().context("building default rbac plan")?;
        services.rbac.seed(&plan).await.context("seeding rbac")?;
    }

    Ok(services)
}

fn notifiers(config: &AppConfig) -> (Arc<dyn Notifier>, Arc<dyn Notifier>) {
    match config.notify_webhook_url.as_deref() {
        Some(url) => {
            let client = reqwest::Client::new();
            (
                Arc::new(WebhookNotifier::new(client.clone(), url, Channel::Email)),
                Arc::new(WebhookNotifier::new(client, url, Channel::Sms)),
            )
        }
        None => {
            info!("NOTIFY_WEBHOOK_URL not set; notifications are logged only");
            (
                Arc::new(LogNotifier::new(Channel::Email)),
                Arc::new(LogNotifier::new(Channel::Sms)),
            )
        }
    }
}
