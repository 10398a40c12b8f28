use borsh::{BorshDeserialize, BorshSerialize};

use crate::math::BPS;

/// Account snapshot reported by the lending venue. Values are in the venue's quote
/// currency with 8 decimals.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountData {
    pub total_collateral_value: u128,
    pub total_debt_value: u128,
    pub available_borrows_value: u128,
    pub liquidation_threshold_bps: u16,
    pub ltv_bps: u16,
    /// Fixed point 6 decimals; `u64::MAX` when there is no debt
    pub health_factor: u64,
}

impl AccountData {
    pub fn has_debt(&self) -> bool {
        self.total_debt_value > 0
    }
}

/// Collateral, debt and health factor of the managed position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMetrics {
    pub collateral_value: u128,
    pub debt_value: u128,
    pub health_factor: u64,
}

impl From<AccountData> for PositionMetrics {
    fn from(data: AccountData) -> Self {
        Self {
            collateral_value: data.total_collateral_value,
            debt_value: data.total_debt_value,
            health_factor: data.health_factor,
        }
    }
}

/// A withdrawal sized against the current net value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub target_assets: u64,
    pub net_value: u64,
    pub is_full_withdrawal: bool,
}

impl WithdrawalRequest {
    pub fn new(target_assets: u64, net_value: u64, full_unwind_threshold_bps: u16) -> Self {
        let threshold = net_value as u128 * full_unwind_threshold_bps as u128 / BPS as u128;
        Self {
            target_assets,
            net_value,
            is_full_withdrawal: target_assets as u128 >= threshold,
        }
    }
}
