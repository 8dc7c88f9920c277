use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    PurchaseIn,
    SaleOut,
    SaleCancelIn,
    AdjustmentIn,
    AdjustmentOut,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::PurchaseIn => "PURCHASE_IN",
            MovementType::SaleOut => "SALE_OUT",
            MovementType::SaleCancelIn => "SALE_CANCEL_IN",
            MovementType::AdjustmentIn => "ADJUSTMENT_IN",
            MovementType::AdjustmentOut => "ADJUSTMENT_OUT",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASE_IN" => Ok(MovementType::PurchaseIn),
            "SALE_OUT" => Ok(MovementType::SaleOut),
            "SALE_CANCEL_IN" => Ok(MovementType::SaleCancelIn),
            "ADJUSTMENT_IN" => Ok(MovementType::AdjustmentIn),
            "ADJUSTMENT_OUT" => Ok(MovementType::AdjustmentOut),
            other => Err(format!("invalid movement type: {other}")),
        }
    }
}

/// StockMovement は在庫数量の増減 1 件。quantity は入庫で正、出庫で負。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct StockMovement {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference_type: String,
    pub reference_id: Option<Uuid>,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batch_id: Uuid,
        product_id: Uuid,
        movement_type: MovementType,
        quantity: i32,
        reference_type: &str,
        reference_id: Option<Uuid>,
        reason: Option<String>,
        created_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            product_id,
            movement_type,
            quantity,
            reference_type: reference_type.to_string(),
            reference_id,
            reason,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        }
    }
}
