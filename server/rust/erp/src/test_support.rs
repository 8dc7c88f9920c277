//! 統合テスト・ハンドラーテスト用のヘルパー。
//!
//! 本番と同じユースケースをインメモリストアまたは任意のリポジトリの上に組み立てる。

use std::sync::Arc;

use secrecy::SecretString;
use yeelo_auth::{Claims, JwtVerifier};

use crate::adapter::handler::AppState;
use crate::adapter::middleware::auth::ErpAuthState;
use crate::domain::catalog::MasterCatalog;
use crate::domain::entity::party::Company;
use crate::domain::repository::{
    InventoryRepository, LedgerRepository, MasterRecordRepository, PurchaseRepository,
    SalesRepository,
};
use crate::usecase::event::DEFAULT_TOPIC_PREFIX;
use crate::usecase::{
    EventFactory, FinancialReportsUseCase, ManageInventoryUseCase, ManageLedgerUseCase,
    ManageMasterRecordsUseCase, ReceiveGoodsUseCase, SalesInvoicesUseCase,
};

pub use crate::infrastructure::persistence::InMemoryStore;

pub const TEST_JWT_SECRET: &str = "yeelo-test-secret";

/// テスト用の自社情報（マハラシュトラ州）。
pub fn test_company() -> Company {
    Company {
        name: "Yeelo Homeo Pharmacy".to_string(),
        gstin: Some("27AAPFU0939F1ZV".to_string()),
        state_code: "27".to_string(),
    }
}

/// 任意のリポジトリ実装から認証なしの AppState を組み立てる。
pub fn app_state_from(
    masters: Arc<dyn MasterRecordRepository>,
    inventory: Arc<dyn InventoryRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    sales: Arc<dyn SalesRepository>,
    ledger: Arc<dyn LedgerRepository>,
) -> AppState {
    let catalog = Arc::new(MasterCatalog::builtin());
    let events = EventFactory::new(DEFAULT_TOPIC_PREFIX);
    let company = test_company();

    AppState {
        masters_uc: Arc::new(ManageMasterRecordsUseCase::new(catalog, masters)),
        inventory_uc: Arc::new(ManageInventoryUseCase::new(
            inventory.clone(),
            events.clone(),
            30,
        )),
        purchases_uc: Arc::new(ReceiveGoodsUseCase::new(
            purchases.clone(),
            inventory.clone(),
            events.clone(),
            company.clone(),
        )),
        sales_uc: Arc::new(SalesInvoicesUseCase::new(
            sales.clone(),
            inventory,
            events.clone(),
            company,
        )),
        ledger_uc: Arc::new(ManageLedgerUseCase::new(ledger.clone(), events)),
        reports_uc: Arc::new(FinancialReportsUseCase::new(ledger, sales, purchases)),
        metrics: Arc::new(
            yeelo_telemetry::metrics::Metrics::new("yeelo_erp_test")
                .expect("metrics registry"),
        ),
        auth_state: None,
        db_pool: None,
    }
}

/// インメモリストアの上に AppState を組み立てる。
pub fn app_state_with(store: Arc<InMemoryStore>) -> AppState {
    app_state_from(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
    )
}

pub fn make_app_state() -> AppState {
    app_state_with(Arc::new(InMemoryStore::default()))
}

pub fn test_auth_state() -> ErpAuthState {
    let verifier = JwtVerifier::new(SecretString::new(TEST_JWT_SECRET.to_string()), None);
    ErpAuthState::new(Arc::new(verifier), "auth-token")
}

/// 指定ロールの有効なトークンを発行する。
pub fn token_for(role: &str) -> String {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    let claims = Claims {
        sub: format!("user-{}", role.to_ascii_lowercase()),
        email: Some(format!("{}@yeelo.test", role.to_ascii_lowercase())),
        name: None,
        role: Some(role.to_string()),
        permissions: Vec::new(),
        is_super_admin: false,
        exp: now + 3600,
        iat: now,
        iss: None,
    };
    JwtVerifier::new(SecretString::new(TEST_JWT_SECRET.to_string()), None)
        .sign(&claims)
        .expect("sign test token")
}
