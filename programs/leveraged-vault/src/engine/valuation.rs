use solana_program::{msg, program_error::ProgramError};

use super::{borrow_in_base, value_in_base, value_in_borrow};
use crate::{
    error::VaultError,
    math::{apply_bps, mul_div, to_u64, Rounding, BPS},
    state::{AssetPair, StrategyConfig},
    venue::Venues,
};

/// Breakdown of the vault's net value in base-asset units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionValuation {
    /// Base asset held directly by the vault
    pub idle_base: u64,
    /// Collateral at the oracle price
    pub collateral_base: u64,
    /// Debt still to reacquire, in borrowed-asset units, net of idle borrowed tokens
    pub debt_borrow: u64,
    /// Base asset needed to buy back `debt_borrow`
    pub unwind_cost_base: u64,
    /// Idle borrowed tokens beyond the debt, at the oracle price
    pub surplus_base: u64,
    /// The swap quote was unavailable and the fixed premium was applied
    pub used_fallback: bool,
    pub net_value: u64,
}

impl PositionValuation {
    /// Value of the leveraged position alone, excluding idle balances.
    pub fn position_value(&self) -> u64 {
        self.collateral_base.saturating_sub(self.unwind_cost_base)
    }
}

/// Values the managed position at what it would realistically fetch if unwound
pub struct PositionValuator;

impl PositionValuator {
    pub fn net_value<E: Venues>(
        env: &E,
        assets: &AssetPair,
        config: &StrategyConfig,
    ) -> Result<u64, ProgramError> {
        Ok(Self::valuate(env, assets, config)?.net_value)
    }

    pub fn valuate<E: Venues>(
        env: &E,
        assets: &AssetPair,
        config: &StrategyConfig,
    ) -> Result<PositionValuation, ProgramError> {
        let idle_base = env.balance_of(&assets.base_mint)?;
        let idle_borrow = env.balance_of(&assets.borrow_mint)?;
        let data = env.get_account_data()?;

        let collateral_base =
            value_in_base(env, assets, data.total_collateral_value, Rounding::Down)?;

        let mut valuation = PositionValuation {
            idle_base,
            collateral_base,
            ..PositionValuation::default()
        };

        let debt_total = if data.has_debt() {
            value_in_borrow(env, assets, data.total_debt_value, Rounding::Up)?
        } else {
            0
        };

        let surplus_borrow = idle_borrow.saturating_sub(debt_total);
        if surplus_borrow > 0 {
            valuation.surplus_base = borrow_in_base(env, assets, surplus_borrow, Rounding::Down)?;
        }

        valuation.debt_borrow = debt_total.saturating_sub(idle_borrow);
        if valuation.debt_borrow > 0 {
            let (cost, used_fallback) = Self::unwind_cost(env, assets, config, valuation.debt_borrow)?;
            valuation.unwind_cost_base = cost;
            valuation.used_fallback = used_fallback;
        }

        let net = idle_base as u128
            + valuation.position_value() as u128
            + valuation.surplus_base as u128;
        valuation.net_value = to_u64(net)?;

        Ok(valuation)
    }

    /// Base asset needed to buy `debt_borrow` of the borrowed asset, priced from a live
    /// swap quote. Falls back to the oracle rate plus a fixed premium when the venue
    /// cannot quote. Returns the cost and whether the fallback was used.
    pub fn unwind_cost<E: Venues>(
        env: &E,
        assets: &AssetPair,
        config: &StrategyConfig,
        debt_borrow: u64,
    ) -> Result<(u64, bool), ProgramError> {
        if debt_borrow == 0 {
            return Ok((0, false));
        }

        let oracle_cost = borrow_in_base(env, assets, debt_borrow, Rounding::Up)?;

        match env.quote(&assets.base_mint, &assets.borrow_mint, oracle_cost) {
            Ok(received) if received > 0 => {
                let cost = mul_div(
                    oracle_cost as u128,
                    debt_borrow as u128,
                    received as u128,
                    Rounding::Up,
                )?;
                Ok((to_u64(cost)?, false))
            }
            quote => {
                match quote {
                    Ok(_) => msg!("Swap quote returned zero, using fallback premium"),
                    Err(err) => msg!("Swap quote failed ({:?}), using fallback premium", err),
                }
                let premium = BPS
                    .checked_add(config.swap_fallback_premium_bps as u64)
                    .ok_or(VaultError::ArithmeticOverflow)?;
                Ok((apply_bps(oracle_cost, premium, Rounding::Up)?, true))
            }
        }
    }
}
