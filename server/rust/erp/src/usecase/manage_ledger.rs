//! 勘定科目と手動仕訳の管理。

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::entity::journal_entry::{JournalEntry, JournalError, JournalLine, SourceType};
use crate::domain::entity::ledger_account::{is_valid_account_code, AccountType, LedgerAccount};
use crate::domain::repository::ledger_repository::EntryFilter;
use crate::domain::repository::LedgerRepository;
use crate::domain::service::record_validator::{reason, FieldViolation};
use crate::domain::value_object::gst;
use crate::usecase::event::{event_type, EventFactory, EventStream};

const MAX_NARRATION_LENGTH: usize = 500;
const MAX_ACCOUNT_NAME_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum FinanceError {
    #[error("ledger account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("journal entry not found: {0}")]
    EntryNotFound(Uuid),
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("{0}")]
    Unbalanced(JournalError),
    #[error("account code already exists: {0}")]
    AccountCodeConflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateAccountInput {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct JournalLineInput {
    pub account_code: String,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct PostJournalInput {
    /// 省略時は当日
    pub entry_date: Option<NaiveDate>,
    pub narration: String,
    pub lines: Vec<JournalLineInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryListParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub source_type: Option<SourceType>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub struct ManageLedgerUseCase {
    repo: Arc<dyn LedgerRepository>,
    events: EventFactory,
}

impl ManageLedgerUseCase {
    pub fn new(repo: Arc<dyn LedgerRepository>, events: EventFactory) -> Self {
        Self { repo, events }
    }

    pub async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, FinanceError> {
        self.repo
            .list_accounts()
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))
    }

    /// 勘定科目を追加する。親科目は同じ勘定種別でなければならない。
    #[tracing::instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_account(
        &self,
        input: &CreateAccountInput,
    ) -> Result<LedgerAccount, FinanceError> {
        let code = input.code.trim();
        let name = input.name.trim();
        let mut violations = Vec::new();
        if !is_valid_account_code(code) {
            violations.push(FieldViolation::new(
                "code",
                reason::PATTERN_MISMATCH,
                "code must be 3 to 10 digits",
            ));
        }
        if name.is_empty() {
            violations.push(FieldViolation::new("name", reason::REQUIRED, "name is required"));
        } else if name.chars().count() > MAX_ACCOUNT_NAME_LENGTH {
            violations.push(FieldViolation::new(
                "name",
                reason::TOO_LONG,
                format!("name must be at most {MAX_ACCOUNT_NAME_LENGTH} characters"),
            ));
        }

        let parent_code = input
            .parent_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(parent_code) = parent_code {
            let parent = self
                .repo
                .find_account_by_code(parent_code)
                .await
                .map_err(|e| FinanceError::Internal(e.to_string()))?;
            match parent {
                None => violations.push(FieldViolation::new(
                    "parent_code",
                    reason::INVALID_REFERENCE,
                    format!("parent account {parent_code} does not exist"),
                )),
                Some(parent) if parent.account_type != input.account_type => {
                    violations.push(FieldViolation::new(
                        "parent_code",
                        reason::INVALID_REFERENCE,
                        format!(
                            "parent account {parent_code} is {}, expected {}",
                            parent.account_type, input.account_type
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        if !violations.is_empty() {
            return Err(FinanceError::Validation(violations));
        }

        let account = LedgerAccount::new(
            code,
            name,
            input.account_type,
            parent_code.map(str::to_string),
        );
        let created = self
            .repo
            .create_account(&account)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        if !created {
            return Err(FinanceError::AccountCodeConflict(code.to_string()));
        }
        tracing::info!(code = %account.code, account_type = %account.account_type, "ledger account created");
        Ok(account)
    }

    /// 手動仕訳を計上する。勘定は存在し有効でなければならない。
    #[tracing::instrument(skip(self, input), fields(lines = input.lines.len()))]
    pub async fn post_manual_entry(
        &self,
        input: &PostJournalInput,
        actor: &str,
    ) -> Result<JournalEntry, FinanceError> {
        let narration = input.narration.trim();
        let mut violations = Vec::new();
        if narration.is_empty() {
            violations.push(FieldViolation::new(
                "narration",
                reason::REQUIRED,
                "narration is required",
            ));
        } else if narration.chars().count() > MAX_NARRATION_LENGTH {
            violations.push(FieldViolation::new(
                "narration",
                reason::TOO_LONG,
                format!("narration must be at most {MAX_NARRATION_LENGTH} characters"),
            ));
        }

        let mut lines = Vec::with_capacity(input.lines.len());
        for (i, line) in input.lines.iter().enumerate() {
            if gst::exceeds_max_amount(line.debit) || gst::exceeds_max_amount(line.credit) {
                violations.push(FieldViolation::new(
                    &format!("lines[{i}]"),
                    reason::OUT_OF_RANGE,
                    format!("amount must not exceed {}", gst::max_amount()),
                ));
            }
            let code = line.account_code.trim();
            let account = self
                .repo
                .find_account_by_code(code)
                .await
                .map_err(|e| FinanceError::Internal(e.to_string()))?
                .filter(|a| a.is_active);
            let Some(account) = account else {
                violations.push(FieldViolation::new(
                    &format!("lines[{i}].account_code"),
                    reason::INVALID_REFERENCE,
                    format!("account {code} does not exist or is inactive"),
                ));
                continue;
            };
            lines.push(JournalLine {
                account_code: account.code,
                account_name: Some(account.name),
                debit: line.debit,
                credit: line.credit,
                description: line
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            });
        }
        if !violations.is_empty() {
            return Err(FinanceError::Validation(violations));
        }

        let entry = JournalEntry::new(
            input.entry_date.unwrap_or_else(super::today),
            narration,
            SourceType::Manual,
            None,
            lines,
            actor,
        )
        .map_err(FinanceError::Unbalanced)?;
        let event = self.events.build(
            EventStream::Finance,
            event_type::JOURNAL_POSTED,
            entry.id.to_string(),
            json!({
                "entry_id": entry.id,
                "entry_number": entry.entry_number,
                "entry_date": entry.entry_date,
                "source_type": entry.source_type,
                "total": entry.total_debit,
                "created_by": actor,
            }),
        );

        self.repo
            .post_entry(&entry, Some(event))
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        tracing::info!(entry_number = %entry.entry_number, total = %entry.total_debit, "manual journal entry posted");
        Ok(entry)
    }

    pub async fn get_entry(&self, id: Uuid) -> Result<JournalEntry, FinanceError> {
        self.repo
            .find_entry(id)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?
            .ok_or(FinanceError::EntryNotFound(id))
    }

    pub async fn list_entries(
        &self,
        params: &EntryListParams,
    ) -> Result<(Vec<JournalEntry>, i64, u32, u32), FinanceError> {
        let (page, page_size) = super::page_window(params.page, params.page_size).map_err(|m| {
            FinanceError::Validation(vec![FieldViolation::new("page", reason::OUT_OF_RANGE, m)])
        })?;
        if let (Some(from), Some(to)) = (params.from, params.to) {
            if from > to {
                return Err(FinanceError::Validation(vec![FieldViolation::new(
                    "from",
                    reason::INVALID_DATE,
                    "from must not be after to",
                )]));
            }
        }
        let (entries, total) = self
            .repo
            .list_entries(&EntryFilter {
                from: params.from,
                to: params.to,
                source_type: params.source_type,
                page,
                page_size,
            })
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        Ok((entries, total, page, page_size))
    }
}
