use sqlx::SqliteConnection;

use crate::{db_types::ChargeAndCommission, traits::LedgerError};

/// The most recent fee and commission configuration row.
pub async fn fetch_charges(conn: &mut SqliteConnection) -> Result<ChargeAndCommission, LedgerError> {
    sqlx::query_as::<_, ChargeAndCommission>(
        "SELECT id, base_delivery_fee, delivery_fee_per_km, delivery_commission_rate, food_laundry_commission_rate, \
         product_commission_rate, payout_charge_tier_low, payout_charge_tier_mid, payout_charge_tier_high, \
         value_added_tax, created_at FROM charges ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| LedgerError::NotFound("no charge configuration".to_string()))
}
