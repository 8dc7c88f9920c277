use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use yeelo_erp_server::adapter;
use yeelo_erp_server::domain;
use yeelo_erp_server::infrastructure;
use yeelo_erp_server::usecase;

use adapter::handler::{self, AppState};
use adapter::middleware::auth::ErpAuthState;
use domain::catalog::MasterCatalog;
use domain::repository::{
    InventoryRepository, LedgerRepository, MasterRecordRepository, PurchaseRepository,
    SalesRepository,
};
use infrastructure::config::Config;
use infrastructure::messaging::{KafkaOutboxPublisher, LoggingOutboxPublisher, MeteredPublisher};
use infrastructure::persistence::{
    InMemoryStore, InventoryPostgresRepository, LedgerPostgresRepository,
    MasterRecordPostgresRepository, PurchasePostgresRepository, SalesPostgresRepository,
};
use usecase::event::DEFAULT_TOPIC_PREFIX;
use yeelo_outbox::{OutboxProcessor, OutboxPublisher, OutboxStore, PostgresOutboxStore};

struct Repositories {
    masters: Arc<dyn MasterRecordRepository>,
    inventory: Arc<dyn InventoryRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    sales: Arc<dyn SalesRepository>,
    ledger: Arc<dyn LedgerRepository>,
    outbox: Arc<dyn OutboxStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Config
    let cfg = Config::load()?;

    // 2. Telemetry
    let telemetry_cfg = yeelo_telemetry::TelemetryConfig {
        service_name: cfg.app.name.clone(),
        version: cfg.app.version.clone(),
        environment: cfg.app.environment.clone(),
        trace_endpoint: cfg.observability.trace_endpoint.clone(),
        sample_rate: cfg.observability.sample_rate,
        log_level: cfg.observability.log_level.clone(),
        log_format: cfg.observability.log_format.clone(),
    };
    yeelo_telemetry::init_telemetry(&telemetry_cfg)
        .map_err(|e| anyhow::anyhow!("failed to init telemetry: {e}"))?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting yeelo erp server"
    );

    // 3. Master catalog
    let catalog = Arc::new(MasterCatalog::builtin());
    if let Err(errors) = catalog.validate() {
        for e in &errors {
            tracing::error!(error = %e, "invalid master catalog");
        }
        anyhow::bail!("master catalog has {} error(s)", errors.len());
    }

    // 4. Metrics
    let metrics = Arc::new(yeelo_telemetry::metrics::Metrics::new("yeelo_erp")?);

    // 5. Repositories
    let db_pool = match cfg.database {
        Some(ref db_cfg) => {
            let pool = infrastructure::database::connect(db_cfg).await?;
            if db_cfg.run_migrations {
                infrastructure::database::run_migrations(&pool).await?;
            }
            Some(pool)
        }
        None => None,
    };

    let repos = match db_pool {
        Some(ref pool) => Repositories {
            masters: Arc::new(MasterRecordPostgresRepository::with_metrics(
                pool.clone(),
                metrics.clone(),
            )),
            inventory: Arc::new(InventoryPostgresRepository::with_metrics(
                pool.clone(),
                metrics.clone(),
            )),
            purchases: Arc::new(PurchasePostgresRepository::with_metrics(
                pool.clone(),
                metrics.clone(),
            )),
            sales: Arc::new(SalesPostgresRepository::with_metrics(
                pool.clone(),
                metrics.clone(),
            )),
            ledger: Arc::new(LedgerPostgresRepository::with_metrics(
                pool.clone(),
                metrics.clone(),
            )),
            outbox: Arc::new(PostgresOutboxStore::new(pool.clone())),
        },
        None => {
            tracing::warn!("database is not configured, using in-memory store (data is lost on restart)");
            let store = Arc::new(InMemoryStore::new(catalog.clone()));
            Repositories {
                masters: store.clone(),
                inventory: store.clone(),
                purchases: store.clone(),
                sales: store.clone(),
                ledger: store.clone(),
                outbox: store,
            }
        }
    };

    // 6. Use cases
    let topic_prefix = cfg
        .kafka
        .as_ref()
        .map_or_else(|| DEFAULT_TOPIC_PREFIX.to_string(), |k| k.topic_prefix.clone());
    let events = usecase::EventFactory::new(topic_prefix);
    let company = cfg.company.to_company();

    let masters_uc = Arc::new(usecase::ManageMasterRecordsUseCase::new(
        catalog.clone(),
        repos.masters.clone(),
    ));
    let inventory_uc = Arc::new(
        usecase::ManageInventoryUseCase::new(
            repos.inventory.clone(),
            events.clone(),
            cfg.inventory.near_expiry_days,
        )
        .with_expiry_window_days(cfg.inventory.expiry_window_days),
    );
    let purchases_uc = Arc::new(usecase::ReceiveGoodsUseCase::new(
        repos.purchases.clone(),
        repos.inventory.clone(),
        events.clone(),
        company.clone(),
    ));
    let sales_uc = Arc::new(usecase::SalesInvoicesUseCase::new(
        repos.sales.clone(),
        repos.inventory.clone(),
        events.clone(),
        company,
    ));
    let ledger_uc = Arc::new(usecase::ManageLedgerUseCase::new(
        repos.ledger.clone(),
        events,
    ));
    let reports_uc = Arc::new(usecase::FinancialReportsUseCase::new(
        repos.ledger.clone(),
        repos.sales.clone(),
        repos.purchases.clone(),
    ));

    // 7. Outbox relay
    let inner: Arc<dyn OutboxPublisher> = match cfg.kafka {
        Some(ref kafka_cfg) => match KafkaOutboxPublisher::new(kafka_cfg) {
            Ok(publisher) => {
                info!(brokers = ?kafka_cfg.brokers, "kafka publisher initialized");
                Arc::new(publisher)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to initialize kafka publisher, events will be logged only");
                Arc::new(LoggingOutboxPublisher)
            }
        },
        None => Arc::new(LoggingOutboxPublisher),
    };
    let publisher: Arc<dyn OutboxPublisher> =
        Arc::new(MeteredPublisher::new(inner, metrics.clone()));
    let relay = OutboxProcessor::new(repos.outbox.clone(), publisher, cfg.outbox.batch_size)
        .with_retention_days(cfg.outbox.retention_days);
    let shutdown = CancellationToken::new();
    let relay_handle = {
        let token = shutdown.clone();
        let interval = Duration::from_millis(cfg.outbox.poll_interval_ms);
        tokio::spawn(async move { relay.run(interval, token).await })
    };

    // 8. Auth
    let auth_state = cfg.auth.as_ref().map(|auth_cfg| {
        let verifier =
            yeelo_auth::JwtVerifier::new(auth_cfg.jwt_secret.clone(), auth_cfg.issuer.clone());
        ErpAuthState::new(Arc::new(verifier), auth_cfg.cookie_name.clone())
    });

    // 9. AppState + Router
    let mut state = AppState {
        masters_uc,
        inventory_uc,
        purchases_uc,
        sales_uc,
        ledger_uc,
        reports_uc,
        metrics: metrics.clone(),
        auth_state: None,
        db_pool: None,
    };
    if let Some(auth_state) = auth_state {
        state = state.with_auth(auth_state);
    }
    if let Some(pool) = db_pool {
        state = state.with_db_pool(pool);
    }

    let app = handler::router(state)
        .layer(RequestBodyLimitLayer::new(cfg.server.request_body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // 10. REST server
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "REST server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(yeelo_server_common::shutdown::shutdown_signal())
        .await?;

    // 未配信のイベントはアウトボックスに残り、次回起動時に配信される
    shutdown.cancel();
    if let Err(e) = relay_handle.await {
        tracing::error!(error = %e, "outbox relay task failed");
    }
    yeelo_telemetry::shutdown();
    info!("yeelo erp server exited");

    Ok(())
}
