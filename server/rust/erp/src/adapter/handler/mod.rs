pub mod error;
pub mod finance_handler;
pub mod health;
pub mod inventory_handler;
pub mod master_handler;
pub mod purchase_handler;
pub mod sales_handler;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use yeelo_auth::{Action, Resource};
use yeelo_telemetry::MetricsLayer;

use crate::adapter::middleware::auth::{auth_middleware, ErpAuthState};
use crate::adapter::middleware::rbac::require_permission;
use crate::usecase::{
    FinancialReportsUseCase, ManageInventoryUseCase, ManageLedgerUseCase,
    ManageMasterRecordsUseCase, ReceiveGoodsUseCase, SalesInvoicesUseCase,
};

pub use yeelo_server_common::{ErrorBody, ErrorResponse};

/// AppState はアプリケーション全体の共有状態を表す。
#[derive(Clone)]
pub struct AppState {
    pub masters_uc: Arc<ManageMasterRecordsUseCase>,
    pub inventory_uc: Arc<ManageInventoryUseCase>,
    pub purchases_uc: Arc<ReceiveGoodsUseCase>,
    pub sales_uc: Arc<SalesInvoicesUseCase>,
    pub ledger_uc: Arc<ManageLedgerUseCase>,
    pub reports_uc: Arc<FinancialReportsUseCase>,
    pub metrics: Arc<yeelo_telemetry::metrics::Metrics>,
    pub auth_state: Option<ErpAuthState>,
    /// readyz で疎通確認する接続プール。インメモリ構成では None。
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn with_auth(mut self, auth_state: ErpAuthState) -> Self {
        self.auth_state = Some(auth_state);
        self
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Yeelo ERP API", version = "0.1.0"),
    paths(
        health::healthz,
        health::readyz,
        health::metrics,
        master_handler::list_masters,
        master_handler::get_schema,
        master_handler::list_records,
        master_handler::list_options,
        master_handler::get_record,
        master_handler::get_history,
        master_handler::create_record,
        master_handler::update_record,
        master_handler::delete_record,
        inventory_handler::stock_levels,
        inventory_handler::list_batches,
        inventory_handler::low_stock,
        inventory_handler::expiry_alerts,
        inventory_handler::summary,
        inventory_handler::movements,
        inventory_handler::adjust_stock,
        purchase_handler::list_grns,
        purchase_handler::get_grn,
        purchase_handler::create_grn,
        purchase_handler::approve_grn,
        purchase_handler::reject_grn,
        sales_handler::list_invoices,
        sales_handler::get_invoice,
        sales_handler::create_invoice,
        sales_handler::cancel_invoice,
        finance_handler::list_accounts,
        finance_handler::create_account,
        finance_handler::account_ledger,
        finance_handler::list_entries,
        finance_handler::get_entry,
        finance_handler::post_entry,
        finance_handler::trial_balance,
        finance_handler::profit_and_loss,
        finance_handler::balance_sheet,
        finance_handler::gst_summary,
        finance_handler::gstr1,
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        crate::adapter::presenter::Pagination,
        crate::usecase::manage_master_records::CatalogGroup,
        crate::usecase::manage_master_records::MasterSummary,
        crate::domain::repository::master_record_repository::MasterOption,
        inventory_handler::AdjustStockRequest,
        inventory_handler::LowStockSummary,
        inventory_handler::ExpirySummary,
        crate::usecase::manage_inventory::AdjustStockOutput,
        crate::domain::entity::stock_report::StockLevel,
        crate::domain::entity::stock_report::LowStockAlert,
        crate::domain::entity::stock_report::ExpiryAlert,
        crate::domain::entity::stock_report::StockSummary,
        crate::domain::entity::inventory_batch::InventoryBatch,
        crate::domain::entity::stock_movement::StockMovement,
        crate::usecase::receive_goods::CreateGrnInput,
        crate::usecase::receive_goods::GrnLineInput,
        purchase_handler::RejectGrnRequest,
        crate::domain::entity::goods_receipt::GoodsReceipt,
        crate::domain::entity::goods_receipt::GrnItem,
        crate::usecase::sales_invoices::CreateInvoiceInput,
        crate::usecase::sales_invoices::InvoiceLineInput,
        crate::usecase::sales_invoices::StockShortfall,
        sales_handler::CancelInvoiceRequest,
        crate::domain::entity::sales_invoice::SalesInvoice,
        crate::domain::entity::sales_invoice::InvoiceItem,
        crate::usecase::manage_ledger::CreateAccountInput,
        crate::usecase::manage_ledger::PostJournalInput,
        crate::usecase::manage_ledger::JournalLineInput,
        crate::domain::entity::ledger_account::LedgerAccount,
        crate::domain::entity::journal_entry::JournalEntry,
        crate::domain::entity::journal_entry::JournalLine,
        crate::domain::entity::financial_report::LedgerStatement,
        crate::domain::entity::financial_report::TrialBalance,
        crate::domain::entity::financial_report::ProfitAndLoss,
        crate::domain::entity::financial_report::BalanceSheet,
        crate::domain::entity::financial_report::GstSummary,
        crate::domain::entity::financial_report::Gstr1Report,
    )),
    security(("bearer_auth" = [])),
)]
pub struct ApiDoc;

fn guarded(router: Router<AppState>, resource: Resource, action: Action) -> Router<AppState> {
    router.route_layer(axum::middleware::from_fn(require_permission(
        resource, action,
    )))
}

fn masters_routes(auth: bool) -> Router<AppState> {
    let read = Router::new()
        .route("/api/v1/masters", get(master_handler::list_masters))
        .route(
            "/api/v1/masters/{master}/schema",
            get(master_handler::get_schema),
        )
        .route(
            "/api/v1/masters/{master}/options",
            get(master_handler::list_options),
        )
        .route(
            "/api/v1/masters/{master}/{id}/history",
            get(master_handler::get_history),
        );
    let list = Router::new().route("/api/v1/masters/{master}", get(master_handler::list_records));
    let create = Router::new().route(
        "/api/v1/masters/{master}",
        post(master_handler::create_record),
    );
    let record = Router::new().route(
        "/api/v1/masters/{master}/{id}",
        get(master_handler::get_record),
    );
    let update = Router::new().route(
        "/api/v1/masters/{master}/{id}",
        axum::routing::put(master_handler::update_record),
    );
    let delete = Router::new().route(
        "/api/v1/masters/{master}/{id}",
        axum::routing::delete(master_handler::delete_record),
    );

    if !auth {
        return read
            .merge(list)
            .merge(create)
            .merge(record)
            .merge(update)
            .merge(delete);
    }
    guarded(read.merge(list).merge(record), Resource::Masters, Action::Read)
        .merge(guarded(create.merge(update), Resource::Masters, Action::Write))
        .merge(guarded(delete, Resource::Masters, Action::Admin))
}

fn inventory_routes(auth: bool) -> Router<AppState> {
    let read = Router::new()
        .route("/api/v1/inventory/stock", get(inventory_handler::stock_levels))
        .route(
            "/api/v1/inventory/batches",
            get(inventory_handler::list_batches),
        )
        .route("/api/v1/inventory/low-stock", get(inventory_handler::low_stock))
        .route(
            "/api/v1/inventory/expiry-alerts",
            get(inventory_handler::expiry_alerts),
        )
        .route("/api/v1/inventory/summary", get(inventory_handler::summary))
        .route(
            "/api/v1/inventory/movements",
            get(inventory_handler::movements),
        );
    let write = Router::new().route(
        "/api/v1/inventory/adjustments",
        post(inventory_handler::adjust_stock),
    );

    if !auth {
        return read.merge(write);
    }
    guarded(read, Resource::Inventory, Action::Read)
        .merge(guarded(write, Resource::Inventory, Action::Write))
}

fn purchase_routes(auth: bool) -> Router<AppState> {
    let read = Router::new()
        .route("/api/v1/purchases/grns", get(purchase_handler::list_grns))
        .route("/api/v1/purchases/grns/{id}", get(purchase_handler::get_grn));
    let write = Router::new().route("/api/v1/purchases/grns", post(purchase_handler::create_grn));
    let admin = Router::new()
        .route(
            "/api/v1/purchases/grns/{id}/approve",
            post(purchase_handler::approve_grn),
        )
        .route(
            "/api/v1/purchases/grns/{id}/reject",
            post(purchase_handler::reject_grn),
        );

    if !auth {
        return read.merge(write).merge(admin);
    }
    guarded(read, Resource::Purchases, Action::Read)
        .merge(guarded(write, Resource::Purchases, Action::Write))
        .merge(guarded(admin, Resource::Purchases, Action::Admin))
}

fn sales_routes(auth: bool) -> Router<AppState> {
    let read = Router::new()
        .route("/api/v1/sales/invoices", get(sales_handler::list_invoices))
        .route("/api/v1/sales/invoices/{id}", get(sales_handler::get_invoice));
    let write = Router::new().route("/api/v1/sales/invoices", post(sales_handler::create_invoice));
    let admin = Router::new().route(
        "/api/v1/sales/invoices/{id}/cancel",
        post(sales_handler::cancel_invoice),
    );

    if !auth {
        return read.merge(write).merge(admin);
    }
    guarded(read, Resource::Sales, Action::Read)
        .merge(guarded(write, Resource::Sales, Action::Write))
        .merge(guarded(admin, Resource::Sales, Action::Admin))
}

fn finance_routes(auth: bool) -> Router<AppState> {
    let read = Router::new()
        .route("/api/v1/finance/accounts", get(finance_handler::list_accounts))
        .route(
            "/api/v1/finance/accounts/{id}/ledger",
            get(finance_handler::account_ledger),
        )
        .route(
            "/api/v1/finance/journal-entries",
            get(finance_handler::list_entries),
        )
        .route(
            "/api/v1/finance/journal-entries/{id}",
            get(finance_handler::get_entry),
        )
        .route(
            "/api/v1/finance/reports/trial-balance",
            get(finance_handler::trial_balance),
        )
        .route(
            "/api/v1/finance/reports/profit-loss",
            get(finance_handler::profit_and_loss),
        )
        .route(
            "/api/v1/finance/reports/balance-sheet",
            get(finance_handler::balance_sheet),
        )
        .route("/api/v1/finance/gst/summary", get(finance_handler::gst_summary))
        .route("/api/v1/finance/gst/gstr1", get(finance_handler::gstr1));
    let write = Router::new().route(
        "/api/v1/finance/journal-entries",
        post(finance_handler::post_entry),
    );
    let admin = Router::new().route(
        "/api/v1/finance/accounts",
        post(finance_handler::create_account),
    );

    if !auth {
        return read.merge(write).merge(admin);
    }
    guarded(read, Resource::Finance, Action::Read)
        .merge(guarded(write, Resource::Finance, Action::Write))
        .merge(guarded(admin, Resource::Finance, Action::Admin))
}

/// REST API ルーターを構築する。
pub fn router(state: AppState) -> Router {
    // 認証不要のエンドポイント
    let public_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics));

    let auth = state.auth_state.is_some();
    let api_routes = Router::new()
        .merge(masters_routes(auth))
        .merge(inventory_routes(auth))
        .merge(purchase_routes(auth))
        .merge(sales_routes(auth))
        .merge(finance_routes(auth));

    // 認証が設定されている場合は全 API ルートで JWT を検証する
    let api_routes = match state.auth_state {
        Some(ref auth_state) => api_routes.layer(axum::middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        )),
        None => {
            tracing::warn!("auth is not configured, API routes are open");
            api_routes
        }
    };

    // ルーティング後に掛けて、一致したルートのテンプレートをラベルにする
    let metrics_layer = MetricsLayer::new(state.metrics.clone());
    public_routes
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(metrics_layer)
        .with_state(state)
}
