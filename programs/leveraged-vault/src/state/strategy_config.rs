use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{
    error::VaultError,
    math::{BPS, ONE},
};

/// Hard cap on supply/borrow/swap iterations per deposit
pub const MAX_LOOP_COUNT: u8 = 10;

/// Hard cap on slippage tolerance (50%)
pub const MAX_SLIPPAGE_BPS: u16 = 5_000;

/// Highest accepted health factor floor (3.0)
pub const MAX_HEALTH_FACTOR_FLOOR: u64 = 3 * ONE;

/// Hard cap on unwind rounds
pub const MAX_UNWIND_ITERATIONS: u8 = 32;

/// Hard cap on the performance fee (30%)
pub const MAX_PERFORMANCE_FEE_BPS: u16 = 3_000;

/// Strategy parameters consumed by the leverage loop and the unwind engine
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyConfig {
    /// LTV used to size each borrow step (basis points)
    pub target_ltv_bps: u16,

    /// Hard LTV ceiling; target must stay strictly below it
    pub max_ltv_bps: u16,

    /// Supply -> borrow -> swap iterations per deposit
    pub loop_count: u8,

    /// Minimum-output discount applied to swap quotes (basis points)
    pub slippage_tolerance_bps: u16,

    /// Health factor floor (fixed point 6 decimals, 1_050_000 = 1.05)
    pub min_health_factor: u64,

    /// A withdrawal of at least this share of net value unwinds everything
    pub full_unwind_threshold_bps: u16,

    /// Collateral withdrawn per full-unwind round relative to the debt it must cover
    pub unwind_buffer_bps: u16,

    /// Debt value considered fully repaid (quote units, 8 decimals)
    pub dust_threshold_value: u64,

    /// Retry ceiling for unwind rounds
    pub max_unwind_iterations: u8,

    /// Premium over the oracle rate assumed when no swap quote is available
    pub swap_fallback_premium_bps: u16,

    /// Share of share-price gains above the high-water mark taken as fee
    pub performance_fee_bps: u16,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            target_ltv_bps: 6_000,
            max_ltv_bps: 7_500,
            loop_count: 3,
            slippage_tolerance_bps: 100,
            min_health_factor: 1_050_000,
            full_unwind_threshold_bps: 9_500,
            unwind_buffer_bps: 11_000,
            dust_threshold_value: 100_000_000, // $1
            max_unwind_iterations: 10,
            swap_fallback_premium_bps: 1_000,
            performance_fee_bps: 0,
        }
    }
}

impl StrategyConfig {
    pub const LEN: usize = 2 + // target_ltv_bps
        2 + // max_ltv_bps
        1 + // loop_count
        2 + // slippage_tolerance_bps
        8 + // min_health_factor
        2 + // full_unwind_threshold_bps
        2 + // unwind_buffer_bps
        8 + // dust_threshold_value
        1 + // max_unwind_iterations
        2 + // swap_fallback_premium_bps
        2; // performance_fee_bps

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.max_ltv_bps as u64 >= BPS || self.target_ltv_bps >= self.max_ltv_bps {
            return Err(VaultError::InvalidTargetLtv.into());
        }

        if self.loop_count == 0 || self.loop_count > MAX_LOOP_COUNT {
            return Err(VaultError::InvalidLoopCount.into());
        }

        if self.slippage_tolerance_bps > MAX_SLIPPAGE_BPS {
            return Err(VaultError::InvalidSlippageTolerance.into());
        }

        if self.min_health_factor <= ONE || self.min_health_factor > MAX_HEALTH_FACTOR_FLOOR {
            return Err(VaultError::InvalidHealthFactorFloor.into());
        }

        if !(5_000..=10_000).contains(&self.full_unwind_threshold_bps)
            || !(10_000..=15_000).contains(&self.unwind_buffer_bps)
            || self.max_unwind_iterations == 0
            || self.max_unwind_iterations > MAX_UNWIND_ITERATIONS
            || self.swap_fallback_premium_bps > MAX_SLIPPAGE_BPS
        {
            return Err(VaultError::InvalidUnwindParameters.into());
        }

        if self.performance_fee_bps > MAX_PERFORMANCE_FEE_BPS {
            return Err(VaultError::InvalidFeeParameters.into());
        }

        Ok(())
    }

    /// Update the loop parameters together; nothing changes on error.
    pub fn set_parameters(
        &mut self,
        target_ltv_bps: u16,
        loop_count: u8,
        slippage_tolerance_bps: u16,
    ) -> Result<(), ProgramError> {
        let mut next = *self;
        next.target_ltv_bps = target_ltv_bps;
        next.loop_count = loop_count;
        next.slippage_tolerance_bps = slippage_tolerance_bps;
        self.commit(next)?;

        msg!(
            "Strategy parameters updated: target LTV {} bps, {} loops, slippage {} bps",
            target_ltv_bps,
            loop_count,
            slippage_tolerance_bps
        );
        Ok(())
    }

    pub fn set_risk_parameters(
        &mut self,
        max_ltv_bps: u16,
        min_health_factor: u64,
    ) -> Result<(), ProgramError> {
        let mut next = *self;
        next.max_ltv_bps = max_ltv_bps;
        next.min_health_factor = min_health_factor;
        self.commit(next)?;

        msg!(
            "Risk parameters updated: max LTV {} bps, health factor floor {}",
            max_ltv_bps,
            min_health_factor
        );
        Ok(())
    }

    pub fn set_unwind_parameters(
        &mut self,
        full_unwind_threshold_bps: u16,
        unwind_buffer_bps: u16,
        dust_threshold_value: u64,
        max_unwind_iterations: u8,
        swap_fallback_premium_bps: u16,
    ) -> Result<(), ProgramError> {
        let mut next = *self;
        next.full_unwind_threshold_bps = full_unwind_threshold_bps;
        next.unwind_buffer_bps = unwind_buffer_bps;
        next.dust_threshold_value = dust_threshold_value;
        next.max_unwind_iterations = max_unwind_iterations;
        next.swap_fallback_premium_bps = swap_fallback_premium_bps;
        self.commit(next)?;

        msg!("Unwind parameters updated");
        Ok(())
    }

    pub fn set_performance_fee(&mut self, performance_fee_bps: u16) -> Result<(), ProgramError> {
        let mut next = *self;
        next.performance_fee_bps = performance_fee_bps;
        self.commit(next)?;

        msg!("Performance fee set to {} bps", performance_fee_bps);
        Ok(())
    }

    fn commit(&mut self, next: StrategyConfig) -> Result<(), ProgramError> {
        next.validate()?;
        *self = next;
        Ok(())
    }
}
