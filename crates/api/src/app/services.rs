use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use instructor_events::{EventPublisher, InMemoryEventBus};
use instructor_infra::{
    AppConfig, CourseCommandHandler,
    config::OutboxConfig,
    event_bus::RedisStreamsPublisher,
    outbox::{OutboxRelay, OutboxStore, RelayHandle},
    store::{
        CourseStore, InMemoryConnectionFactory, InMemoryCourseStore, PgConnectionFactory,
        StoreGateway,
    },
};

pub type DynStore = Arc<dyn CourseStore>;
pub type DynPublisher = Arc<dyn EventPublisher>;
pub type CourseHandler = CourseCommandHandler<DynStore, DynPublisher>;

/// Everything a request handler needs, constructed once at startup.
pub struct AppServices {
    pub handler: CourseHandler,
}

/// Wire the process from config.
///
/// The store is initialized here, before the listener is bound, so the first
/// request never pays for (or races on) connection setup. The returned relay
/// handle must be shut down after the server stops.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<(AppServices, RelayHandle)> {
    let publisher: DynPublisher = match &config.redis_url {
        Some(url) => {
            info!(stream_key = %config.stream_key, "publishing to redis streams");
            Arc::new(
                RedisStreamsPublisher::new(url, Some(config.stream_key.clone()))
                    .context("failed to create redis streams publisher")?,
            )
        }
        None => {
            info!("REDIS_URL not set; publishing to the in-memory bus");
            Arc::new(InMemoryEventBus::new())
        }
    };

    match &config.database {
        Some(db) => {
            let gateway = Arc::new(StoreGateway::new(PgConnectionFactory::new(db.clone())));
            let store = gateway
                .ensure_initialized()
                .await
                .context("failed to initialize postgres course store")?
                .clone();

            Ok(wire(gateway, store, publisher, config))
        }
        None => {
            info!("POSTGRES_URL not set; using the in-memory course store");
            let factory = InMemoryConnectionFactory::default();
            let store = factory.store().clone();
            let gateway = Arc::new(StoreGateway::new(factory));
            gateway
                .ensure_initialized()
                .await
                .context("failed to initialize in-memory course store")?;

            Ok(wire(gateway, store, publisher, config))
        }
    }
}

/// In-memory wiring around caller-owned store and bus (tests/dev).
pub fn build_in_memory_services(
    store: Arc<InMemoryCourseStore>,
    bus: Arc<InMemoryEventBus>,
    config: &AppConfig,
) -> (AppServices, RelayHandle) {
    wire(store.clone(), store, bus, config)
}

fn wire<S, O>(
    store: Arc<S>,
    outbox: O,
    publisher: DynPublisher,
    config: &AppConfig,
) -> (AppServices, RelayHandle)
where
    S: CourseStore + 'static,
    O: OutboxStore + 'static,
{
    let relay = spawn_relay(outbox, publisher.clone(), &config.outbox);

    let store: DynStore = store;
    let handler = CourseCommandHandler::new(store, publisher, config.publish_retry.clone())
        .with_relay_trigger(relay.trigger());

    (AppServices { handler }, relay)
}

fn spawn_relay<O>(outbox: O, publisher: DynPublisher, config: &OutboxConfig) -> RelayHandle
where
    O: OutboxStore + 'static,
{
    OutboxRelay::new(outbox, publisher)
        .with_max_attempts(config.max_attempts)
        .with_batch_size(config.batch_size)
        .spawn(config.poll_interval)
}
