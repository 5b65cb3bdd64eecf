//! The fee calculator. Pure functions over the [`ChargeAndCommission`]
//! configuration row; no I/O, no clamping of bad inputs. Negative or zero
//! distances and amounts are rejected with [`FeeError::InvalidAmount`].

use mse_common::Naira;
use thiserror::Error;

use crate::db_types::{ChargeAndCommission, OrderItem, OrderType};

#[derive(Debug, Clone, Error)]
pub enum FeeError {
    #[error("Invalid amount. {0}")]
    InvalidAmount(String),
}

/// The delivery fee for a trip. Flat base fee for short hops (≤ 1 km),
/// otherwise distance times the per-km rate.
pub fn delivery_fee(charges: &ChargeAndCommission, distance_km: f64) -> Result<Naira, FeeError> {
    if distance_km <= 0.0 || !distance_km.is_finite() {
        return Err(FeeError::InvalidAmount(format!("distance must be positive, got {distance_km}")));
    }
    if distance_km <= 1.0 {
        Ok(charges.base_delivery_fee)
    } else {
        #[allow(clippy::cast_possible_truncation)]
        Ok(Naira::from_kobo((charges.delivery_fee_per_km.value() as f64 * distance_km).round() as i64))
    }
}

/// The dispatch payout: the delivery fee less the platform's delivery commission.
pub fn dispatch_payout(charges: &ChargeAndCommission, fee: Naira) -> Result<Naira, FeeError> {
    if !fee.is_positive() {
        return Err(FeeError::InvalidAmount(format!("delivery fee must be positive, got {fee}")));
    }
    Ok(fee - fee.apply_rate(charges.delivery_commission_rate))
}

/// The goods total for an order's line items.
pub fn items_total(items: &[OrderItem]) -> Result<Naira, FeeError> {
    let total: Naira = items.iter().map(OrderItem::line_total).sum();
    if !total.is_positive() {
        return Err(FeeError::InvalidAmount(format!("order items must total a positive amount, got {total}")));
    }
    Ok(total)
}

/// The vendor payout: the goods total less the commission for the order category.
/// Package deliveries have no vendor leg and are rejected here.
pub fn vendor_payout(charges: &ChargeAndCommission, order_type: OrderType, items: &[OrderItem]) -> Result<Naira, FeeError> {
    let rate = match order_type {
        OrderType::Food | OrderType::Laundry => charges.food_laundry_commission_rate,
        OrderType::Product => charges.product_commission_rate,
        OrderType::Package => {
            return Err(FeeError::InvalidAmount("package orders have no vendor payout".to_string()))
        },
    };
    let total = items_total(items)?;
    Ok(total - total.apply_rate(rate))
}

/// The full cost breakdown of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalBreakdown {
    /// The amount leaving the wallet.
    pub gross: Naira,
    /// The tiered payout charge.
    pub charge: Naira,
    /// VAT levied on the charge.
    pub vat: Naira,
    /// What the user receives.
    pub net: Naira,
}

/// Computes the payable amount for a withdrawal: the tiered payout charge
/// (tiers at ₦5 000 and ₦50 000) plus VAT on that charge are deducted.
pub fn withdrawal_net(charges: &ChargeAndCommission, amount: Naira) -> Result<WithdrawalBreakdown, FeeError> {
    if !amount.is_positive() {
        return Err(FeeError::InvalidAmount(format!("withdrawal amount must be positive, got {amount}")));
    }
    let charge = if amount <= Naira::from_naira(5_000) {
        charges.payout_charge_tier_low
    } else if amount <= Naira::from_naira(50_000) {
        charges.payout_charge_tier_mid
    } else {
        charges.payout_charge_tier_high
    };
    let vat = charge.apply_rate(charges.value_added_tax);
    let net = amount - charge - vat;
    if !net.is_positive() {
        return Err(FeeError::InvalidAmount(format!(
            "withdrawal of {amount} does not cover the {charge} charge and {vat} VAT"
        )));
    }
    Ok(WithdrawalBreakdown { gross: amount, charge, vat, net })
}
