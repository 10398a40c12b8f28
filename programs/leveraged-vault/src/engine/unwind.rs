use solana_program::{msg, program_error::ProgramError};

use super::{
    borrow_in_base, repay_debt, settle_idle_borrow, supply_collateral, swap_with_backoff,
    value_in_base, value_in_borrow, withdraw_with_backoff, PositionValuator,
};
use crate::{
    error::VaultError,
    math::{apply_bps, mul_div, to_u64, Rounding, BPS, ONE},
    state::{AccountData, AssetPair, StrategyConfig, WithdrawalRequest},
    venue::Venues,
};

/// Trace of one withdraw -> swap -> repay round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnwindRound {
    pub round: u8,
    pub withdrawn: u64,
    pub sold: u64,
    pub repaid: u64,
    /// Position after the round
    pub collateral_value: u128,
    pub debt_value: u128,
    pub health_factor: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnwindOutcome {
    pub full: bool,
    /// Base asset released into the vault; may be less than requested
    pub freed: u64,
    pub rounds: Vec<UnwindRound>,
    pub remaining_debt_value: u128,
    pub health_factor: u64,
    /// Debt above dust remained because withdraws or swaps ran dry
    pub liquidity_starved: bool,
}

/// Reduces the leveraged position to release base asset
pub struct UnwindEngine;

impl UnwindEngine {
    /// Release `target_amount` of base asset, picking the full or proportional path
    /// against the current net value.
    pub fn unwind<E: Venues>(
        env: &mut E,
        assets: &AssetPair,
        config: &StrategyConfig,
        target_amount: u64,
    ) -> Result<UnwindOutcome, ProgramError> {
        if target_amount == 0 {
            return Ok(UnwindOutcome::default());
        }

        let net_value = PositionValuator::net_value(&*env, assets, config)?;
        let request =
            WithdrawalRequest::new(target_amount, net_value, config.full_unwind_threshold_bps);

        msg!(
            "Unwinding {} of {} (full: {})",
            request.target_assets,
            request.net_value,
            request.is_full_withdrawal
        );

        if request.is_full_withdrawal {
            Self::full_unwind(env, assets, config)
        } else {
            Self::partial_unwind(env, assets, config, target_amount)
        }
    }

    /// Repay the whole debt and release all collateral, as far as the venues allow.
    ///
    /// Rounds may withdraw down to the liquidation line since each one sells and repays
    /// before the next. A round whose swap fails resupplies the collateral it took beyond
    /// the floor. Ending below the floor and below the starting health factor fails.
    pub fn full_unwind<E: Venues>(
        env: &mut E,
        assets: &AssetPair,
        config: &StrategyConfig,
    ) -> Result<UnwindOutcome, ProgramError> {
        let start_balance = env.balance_of(&assets.base_mint)?;
        let start = env.get_account_data()?;
        let mut outcome = UnwindOutcome {
            full: true,
            ..UnwindOutcome::default()
        };

        settle_idle_borrow(env, assets)?;

        let sell_cap_bps = BPS + config.slippage_tolerance_bps as u64;

        for round in 1..=config.max_unwind_iterations {
            let data = env.get_account_data()?;
            if data.total_debt_value <= config.dust_threshold_value as u128 {
                break;
            }

            let debt_borrow = value_in_borrow(&*env, assets, data.total_debt_value, Rounding::Up)?;
            let debt_base = borrow_in_base(&*env, assets, debt_borrow, Rounding::Up)?;
            let buffered = apply_bps(debt_base, config.unwind_buffer_bps as u64, Rounding::Up)?;
            // The same round repays, so a withdrawal may reach past the floor toward the
            // liquidation line
            let floor_headroom = Self::withdrawable_base(&*env, assets, config, &data)?;
            let headroom = Self::headroom_above(&*env, assets, &data, ONE)?;

            let withdrawn = match buffered.min(headroom) {
                0 => 0,
                amount => withdraw_with_backoff(env, assets, amount)?,
            };

            let available = env.balance_of(&assets.base_mint)?;
            let (cost, _) = PositionValuator::unwind_cost(&*env, assets, config, debt_borrow)?;
            let to_sell = available.min(apply_bps(cost, sell_cap_bps, Rounding::Up)?);
            if to_sell == 0 {
                msg!("Unwind round {}: nothing left to sell", round);
                outcome.liquidity_starved = true;
                break;
            }

            let (sold, bought) = swap_with_backoff(
                env,
                &assets.base_mint,
                &assets.borrow_mint,
                to_sell,
                config.slippage_tolerance_bps,
            )?;
            if bought == 0 {
                // Put back what was taken beyond the floor
                let excess = withdrawn
                    .saturating_sub(floor_headroom)
                    .min(env.balance_of(&assets.base_mint)?);
                if excess > 0 {
                    supply_collateral(env, assets, excess)?;
                }
                msg!("Unwind round {}: swap venue starved, resupplied {}", round, excess);
                outcome.liquidity_starved = true;
                break;
            }

            let repaid = settle_idle_borrow(env, assets)?;
            let record = Self::record_round(&*env, round, withdrawn, sold, repaid)?;
            msg!(
                "Unwind round {}: withdrew {}, sold {}, repaid {}, health factor {}",
                round,
                withdrawn,
                sold,
                repaid,
                record.health_factor
            );
            outcome.rounds.push(record);
        }

        Self::sweep(env, assets, config);

        let end = env.get_account_data()?;
        let end_balance = env.balance_of(&assets.base_mint)?;
        outcome.freed = end_balance.saturating_sub(start_balance);
        outcome.remaining_debt_value = end.total_debt_value;
        outcome.health_factor = end.health_factor;
        if end.total_debt_value > config.dust_threshold_value as u128 {
            outcome.liquidity_starved = true;
        }

        if outcome.freed == 0 && start.total_collateral_value > 0 {
            msg!("Full unwind released nothing");
            return Err(VaultError::UnwindFailed.into());
        }

        if end.has_debt()
            && end.health_factor < config.min_health_factor
            && end.health_factor < start.health_factor
        {
            msg!(
                "Full unwind left health factor {} below floor {}",
                end.health_factor,
                config.min_health_factor
            );
            return Err(VaultError::HealthFactorBelowFloor.into());
        }

        Ok(outcome)
    }

    /// Release `target_amount` by unwinding the matching slice of collateral and debt.
    pub fn partial_unwind<E: Venues>(
        env: &mut E,
        assets: &AssetPair,
        config: &StrategyConfig,
        target_amount: u64,
    ) -> Result<UnwindOutcome, ProgramError> {
        let start_balance = env.balance_of(&assets.base_mint)?;
        let health_factor_start = env.get_account_data()?.health_factor;
        let mut outcome = UnwindOutcome::default();

        settle_idle_borrow(env, assets)?;

        let valuation = PositionValuator::valuate(&*env, assets, config)?;
        let position_value = valuation.position_value();
        let data = env.get_account_data()?;

        let (debt_target, collateral_target) = if position_value == 0 {
            (0, 0)
        } else {
            let slice = target_amount.min(position_value) as u128;
            let debt_total = if data.has_debt() {
                value_in_borrow(&*env, assets, data.total_debt_value, Rounding::Up)?
            } else {
                0
            };
            let collateral_total =
                value_in_base(&*env, assets, data.total_collateral_value, Rounding::Down)?;
            (
                to_u64(mul_div(debt_total as u128, slice, position_value as u128, Rounding::Up)?)?,
                to_u64(mul_div(
                    collateral_total as u128,
                    slice,
                    position_value as u128,
                    Rounding::Up,
                )?)?,
            )
        };

        let sell_cap_bps = BPS + config.slippage_tolerance_bps as u64;
        let mut withdrawn_total: u64 = 0;
        let mut repaid_total: u64 = 0;

        for round in 1..=config.max_unwind_iterations {
            let freed = env.balance_of(&assets.base_mint)?.saturating_sub(start_balance);
            let data = env.get_account_data()?;
            let debt_now = if data.has_debt() {
                value_in_borrow(&*env, assets, data.total_debt_value, Rounding::Up)?
            } else {
                0
            };
            let debt_left = debt_target.saturating_sub(repaid_total).min(debt_now);
            if freed >= target_amount && debt_left == 0 {
                break;
            }

            let debt_left_base = apply_bps(
                borrow_in_base(&*env, assets, debt_left, Rounding::Up)?,
                sell_cap_bps,
                Rounding::Up,
            )?;
            let collateral_left = collateral_target.saturating_sub(withdrawn_total);
            let wanted = collateral_left
                .max(target_amount.saturating_sub(freed).saturating_add(debt_left_base));
            let headroom = Self::withdrawable_base(&*env, assets, config, &data)?;
            let amount = wanted.min(headroom);
            if amount == 0 {
                msg!("Unwind round {}: no headroom above the health factor floor", round);
                break;
            }

            let withdrawn = withdraw_with_backoff(env, assets, amount)?;
            if withdrawn == 0 {
                msg!("Unwind round {}: collateral withdraw rejected", round);
                break;
            }
            withdrawn_total = withdrawn_total.saturating_add(withdrawn);

            let mut sold = 0;
            let mut repaid = 0;
            if debt_left > 0 {
                let (swapped, bought) = swap_with_backoff(
                    env,
                    &assets.base_mint,
                    &assets.borrow_mint,
                    withdrawn.min(debt_left_base),
                    config.slippage_tolerance_bps,
                )?;
                sold = swapped;
                if bought > 0 {
                    repaid = repay_debt(env, assets, bought.min(debt_left))?;
                }
            }
            repaid_total = repaid_total.saturating_add(repaid);

            let surplus = env.balance_of(&assets.borrow_mint)?;
            if surplus > 0 {
                swap_with_backoff(
                    env,
                    &assets.borrow_mint,
                    &assets.base_mint,
                    surplus,
                    config.slippage_tolerance_bps,
                )?;
            }

            let record = Self::record_round(&*env, round, withdrawn, sold, repaid)?;
            msg!(
                "Unwind round {}: withdrew {}, sold {}, repaid {}, health factor {}",
                round,
                withdrawn,
                sold,
                repaid,
                record.health_factor
            );
            outcome.rounds.push(record);
        }

        let end = env.get_account_data()?;
        outcome.freed = env
            .balance_of(&assets.base_mint)?
            .saturating_sub(start_balance);
        outcome.remaining_debt_value = end.total_debt_value;
        outcome.health_factor = end.health_factor;

        if end.has_debt()
            && end.health_factor < config.min_health_factor
            && end.health_factor < health_factor_start
        {
            msg!(
                "Partial unwind left health factor {} below floor {}",
                end.health_factor,
                config.min_health_factor
            );
            return Err(VaultError::HealthFactorBelowFloor.into());
        }

        Ok(outcome)
    }

    /// Base collateral that can leave without pushing the health factor under the floor.
    pub fn withdrawable_base<E: Venues>(
        env: &E,
        assets: &AssetPair,
        config: &StrategyConfig,
        data: &AccountData,
    ) -> Result<u64, ProgramError> {
        Self::headroom_above(env, assets, data, config.min_health_factor)
    }

    fn headroom_above<E: Venues>(
        env: &E,
        assets: &AssetPair,
        data: &AccountData,
        health_factor: u64,
    ) -> Result<u64, ProgramError> {
        if !data.has_debt() {
            return value_in_base(env, assets, data.total_collateral_value, Rounding::Down);
        }
        if data.liquidation_threshold_bps == 0 {
            return Ok(0);
        }

        let floor_debt = mul_div(
            data.total_debt_value,
            health_factor as u128,
            ONE as u128,
            Rounding::Up,
        )?;
        let required = mul_div(
            floor_debt,
            BPS as u128,
            data.liquidation_threshold_bps as u128,
            Rounding::Up,
        )?;
        let free_value = data.total_collateral_value.saturating_sub(required);
        value_in_base(env, assets, free_value, Rounding::Down)
    }

    /// Best-effort cleanup once the rounds are done: buy back what debt is left with idle
    /// base, withdraw what the floor then allows (everything once the debt is gone) and
    /// convert leftover borrowed asset back to base. Failures are logged only.
    fn sweep<E: Venues>(env: &mut E, assets: &AssetPair, config: &StrategyConfig) {
        if let Err(err) = Self::try_sweep(env, assets, config) {
            msg!("Sweep stopped: {:?}", err);
        }
    }

    fn try_sweep<E: Venues>(
        env: &mut E,
        assets: &AssetPair,
        config: &StrategyConfig,
    ) -> Result<(), ProgramError> {
        settle_idle_borrow(env, assets)?;

        let mut data = env.get_account_data()?;
        if data.has_debt() {
            let headroom = Self::withdrawable_base(&*env, assets, config, &data)?;
            if headroom > 0 {
                withdraw_with_backoff(env, assets, headroom)?;
            }

            let debt_borrow = value_in_borrow(&*env, assets, data.total_debt_value, Rounding::Up)?;
            let (cost, _) = PositionValuator::unwind_cost(&*env, assets, config, debt_borrow)?;
            let to_sell = env.balance_of(&assets.base_mint)?.min(apply_bps(
                cost,
                BPS + config.slippage_tolerance_bps as u64,
                Rounding::Up,
            )?);
            if to_sell > 0 {
                swap_with_backoff(
                    env,
                    &assets.base_mint,
                    &assets.borrow_mint,
                    to_sell,
                    config.slippage_tolerance_bps,
                )?;
                settle_idle_borrow(env, assets)?;
            }
            data = env.get_account_data()?;
        }

        let releasable = if data.has_debt() {
            Self::withdrawable_base(&*env, assets, config, &data)?
        } else {
            // Round up so the venue caps the request at the full balance
            value_in_base(&*env, assets, data.total_collateral_value, Rounding::Up)?
        };
        if releasable > 0 {
            withdraw_with_backoff(env, assets, releasable)?;
        }

        if data.has_debt() {
            return Ok(());
        }
        let surplus = env.balance_of(&assets.borrow_mint)?;
        if surplus > 0 {
            swap_with_backoff(
                env,
                &assets.borrow_mint,
                &assets.base_mint,
                surplus,
                config.slippage_tolerance_bps,
            )?;
        }
        Ok(())
    }

    fn record_round<E: Venues>(
        env: &E,
        round: u8,
        withdrawn: u64,
        sold: u64,
        repaid: u64,
    ) -> Result<UnwindRound, ProgramError> {
        let data = env.get_account_data()?;
        Ok(UnwindRound {
            round,
            withdrawn,
            sold,
            repaid,
            collateral_value: data.total_collateral_value,
            debt_value: data.total_debt_value,
            health_factor: data.health_factor,
        })
    }
}
