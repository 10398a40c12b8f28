//! Caller-facing vault: share ledger, deposits and withdrawals over the strategy engines.
//!
//! Every mutating operation runs against a staged copy of the collaborators, the vault
//! state and the holder ledger. The copy replaces the live vault only when the whole
//! operation succeeded, so a failed deposit or withdrawal leaves no trace.

use std::collections::BTreeMap;

use solana_program::{msg, program_error::ProgramError, pubkey::Pubkey};

use crate::{
    engine::{LeverageLoopController, PositionValuation, PositionValuator, UnwindEngine, UnwindOutcome},
    error::VaultError,
    math::{apply_bps, mul_div, to_u64, Rounding, ShareMath, SHARE_PRICE_SCALE},
    state::{AssetPair, PositionMetrics, StrategyConfig, VaultState},
    venue::Venues,
};

#[derive(Debug, Clone)]
pub struct LeveragedVault<E: Venues + Clone> {
    env: E,
    state: VaultState,
    holders: BTreeMap<Pubkey, u128>,
    math: ShareMath,
}

impl<E: Venues + Clone> LeveragedVault<E> {
    /// Wrap a freshly initialized vault state. The holder ledger starts empty, so the
    /// state must not carry outstanding shares.
    pub fn new(env: E, state: VaultState) -> Result<Self, ProgramError> {
        state.validate()?;
        if state.total_shares != 0 {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(Self {
            env,
            state,
            holders: BTreeMap::new(),
            math: ShareMath::default(),
        })
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Direct access to the collaborators, outside any staged operation.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.state.config
    }

    pub fn assets(&self) -> &AssetPair {
        &self.state.assets
    }

    pub fn total_shares(&self) -> u128 {
        self.state.total_shares
    }

    pub fn shares_of(&self, holder: &Pubkey) -> u128 {
        self.holders.get(holder).copied().unwrap_or(0)
    }

    /// Live net value in base-asset units: idle balance plus the unwind value of the
    /// leveraged position.
    pub fn total_assets(&self) -> Result<u64, ProgramError> {
        PositionValuator::net_value(&self.env, &self.state.assets, &self.state.config)
    }

    pub fn valuation(&self) -> Result<PositionValuation, ProgramError> {
        PositionValuator::valuate(&self.env, &self.state.assets, &self.state.config)
    }

    pub fn convert_to_shares(&self, assets: u64) -> Result<u128, ProgramError> {
        self.math
            .to_shares(assets, self.state.total_shares, self.total_assets()?, false)
    }

    pub fn convert_to_assets(&self, shares: u128) -> Result<u64, ProgramError> {
        self.math
            .to_assets(shares, self.state.total_shares, self.total_assets()?, false)
    }

    pub fn preview_deposit(&self, assets: u64) -> Result<u128, ProgramError> {
        self.convert_to_shares(assets)
    }

    /// Shares a withdrawal of `assets` burns, rounded against the caller.
    pub fn preview_withdraw(&self, assets: u64) -> Result<u128, ProgramError> {
        self.math
            .to_shares(assets, self.state.total_shares, self.total_assets()?, true)
    }

    pub fn preview_redeem(&self, shares: u128) -> Result<u64, ProgramError> {
        self.convert_to_assets(shares)
    }

    pub fn share_price(&self) -> Result<u128, ProgramError> {
        self.math
            .share_price(self.state.total_shares, self.total_assets()?)
    }

    pub fn is_bootstrap_phase(&self) -> bool {
        self.math.is_bootstrap_phase(self.state.total_shares)
    }

    pub fn estimate_attack_cost(&self, target_ratio: u128) -> Result<u128, ProgramError> {
        self.math
            .estimate_attack_cost(target_ratio, self.state.total_shares, self.total_assets()?)
    }

    pub fn position_metrics(&self) -> Result<PositionMetrics, ProgramError> {
        Ok(self.env.get_account_data()?.into())
    }

    /// Pull `amount` of base asset from `depositor`, lever it up and mint shares priced
    /// against the net value before the deposit.
    pub fn deposit(&mut self, depositor: &Pubkey, amount: u64) -> Result<u128, ProgramError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount.into());
        }

        let total_assets = self.total_assets()?;
        let was_empty = self.state.total_shares == 0;
        let shares = self
            .math
            .to_shares(amount, self.state.total_shares, total_assets, false)?;
        if shares == 0 {
            return Err(VaultError::ZeroShares.into());
        }

        self.staged(|vault| {
            let base_mint = vault.state.assets.base_mint;
            vault.env.transfer_in(depositor, &base_mint, amount)?;

            let outcome = LeverageLoopController::execute_loops(
                &mut vault.env,
                &vault.state.assets,
                &vault.state.config,
                amount,
            )?;
            msg!(
                "Deposit of {}: {} loops, supplied {}, borrowed {}, health factor {}",
                amount,
                outcome.iterations,
                outcome.total_supplied,
                outcome.total_borrowed,
                outcome.health_factor
            );

            vault.mint(depositor, shares)?;
            vault.refresh()?;
            if was_empty {
                vault.state.high_water_mark = vault.share_price()?;
            }
            Ok(shares)
        })
    }

    /// Send exactly `assets` to `receiver`, burning the owner's shares rounded up.
    pub fn withdraw(
        &mut self,
        owner: &Pubkey,
        receiver: &Pubkey,
        assets: u64,
    ) -> Result<u128, ProgramError> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount.into());
        }

        let shares = self.preview_withdraw(assets)?;
        if shares > self.shares_of(owner) {
            return Err(VaultError::InsufficientShares.into());
        }

        self.staged(|vault| {
            let available = vault.release(assets)?;
            if available < assets {
                msg!("Released {} of {} requested", available, assets);
                return Err(VaultError::InsufficientLiquidity.into());
            }

            let base_mint = vault.state.assets.base_mint;
            vault.env.transfer_out(receiver, &base_mint, assets)?;
            vault.burn(owner, shares)?;
            vault.refresh()?;
            Ok(shares)
        })
    }

    /// Send what the unwind actually released, up to the value of `shares`. A short
    /// release burns only the shares covering the payout, rounded up; the owner keeps
    /// the rest.
    pub fn redeem(
        &mut self,
        owner: &Pubkey,
        receiver: &Pubkey,
        shares: u128,
    ) -> Result<u64, ProgramError> {
        if shares == 0 {
            return Err(VaultError::ZeroShares.into());
        }
        if shares > self.shares_of(owner) {
            return Err(VaultError::InsufficientShares.into());
        }

        let total_shares = self.state.total_shares;
        let total_assets = self.total_assets()?;
        let owed = self
            .math
            .to_assets(shares, total_shares, total_assets, false)?;
        if owed == 0 {
            return Err(VaultError::ZeroAmount.into());
        }

        self.staged(|vault| {
            let paid = vault.release(owed)?.min(owed);
            if paid == 0 {
                return Err(VaultError::InsufficientLiquidity.into());
            }

            let burned = if paid < owed {
                vault
                    .math
                    .to_shares(paid, total_shares, total_assets, true)?
                    .min(shares)
            } else {
                shares
            };
            if burned < shares {
                msg!(
                    "Redeem paying {} of {} owed, burning {} of {} shares",
                    paid,
                    owed,
                    burned,
                    shares
                );
            }

            let base_mint = vault.state.assets.base_mint;
            vault.env.transfer_out(receiver, &base_mint, paid)?;
            vault.burn(owner, burned)?;
            vault.refresh()?;
            Ok(paid)
        })
    }

    /// Unwind the whole position into idle base asset. Shares are untouched.
    pub fn emergency_deleverage(&mut self) -> Result<UnwindOutcome, ProgramError> {
        self.staged(|vault| {
            let outcome =
                UnwindEngine::full_unwind(&mut vault.env, &vault.state.assets, &vault.state.config)?;
            msg!(
                "Emergency deleverage freed {}, remaining debt value {}",
                outcome.freed,
                outcome.remaining_debt_value
            );
            vault.refresh()?;
            Ok(outcome)
        })
    }

    /// Mint fee shares to the fee recipient for share-price gains above the high-water
    /// mark. Returns the shares minted.
    pub fn accrue_performance_fee(&mut self) -> Result<u128, ProgramError> {
        let total_assets = self.total_assets()?;
        let total_shares = self.state.total_shares;
        if total_shares == 0 {
            return Ok(0);
        }

        let price = self.math.share_price(total_shares, total_assets)?;
        if price <= self.state.high_water_mark {
            return Ok(0);
        }

        let fee_bps = self.state.config.performance_fee_bps;
        if fee_bps == 0 {
            self.state.high_water_mark = price;
            return Ok(0);
        }

        let gain = mul_div(
            price - self.state.high_water_mark,
            total_shares.saturating_add(self.math.share_offset),
            SHARE_PRICE_SCALE,
            Rounding::Down,
        )?;
        let gain = to_u64(gain)?;
        let fee_assets = apply_bps(gain, fee_bps as u64, Rounding::Down)?;
        if fee_assets == 0 {
            return Ok(0);
        }

        // Price the new shares so existing holders keep the value net of the fee
        let fee_shares = self.math.to_shares(
            fee_assets,
            total_shares,
            total_assets.saturating_sub(fee_assets),
            false,
        )?;
        if fee_shares == 0 {
            return Ok(0);
        }

        let recipient = self.state.fee_recipient;
        self.mint(&recipient, fee_shares)?;
        self.state.high_water_mark = self.math.share_price(self.state.total_shares, total_assets)?;
        self.state.cached_total_assets = total_assets;

        msg!(
            "Performance fee: {} assets as {} shares, high-water mark {}",
            fee_assets,
            fee_shares,
            self.state.high_water_mark
        );
        Ok(fee_shares)
    }

    /// Re-read venue data and net value into the cached totals.
    pub fn refresh(&mut self) -> Result<(), ProgramError> {
        let data = self.env.get_account_data()?;
        self.state.cached_total_assets = self.total_assets()?;
        self.state.cached_collateral_value = data.total_collateral_value;
        self.state.cached_debt_value = data.total_debt_value;
        self.state.cached_health_factor = data.health_factor;
        Ok(())
    }

    pub fn set_strategy_parameters(
        &mut self,
        target_ltv_bps: u16,
        loop_count: u8,
        slippage_tolerance_bps: u16,
    ) -> Result<(), ProgramError> {
        self.state
            .config
            .set_parameters(target_ltv_bps, loop_count, slippage_tolerance_bps)
    }

    pub fn set_risk_parameters(
        &mut self,
        max_ltv_bps: u16,
        min_health_factor: u64,
    ) -> Result<(), ProgramError> {
        self.state
            .config
            .set_risk_parameters(max_ltv_bps, min_health_factor)
    }

    pub fn set_unwind_parameters(
        &mut self,
        full_unwind_threshold_bps: u16,
        unwind_buffer_bps: u16,
        dust_threshold_value: u64,
        max_unwind_iterations: u8,
        swap_fallback_premium_bps: u16,
    ) -> Result<(), ProgramError> {
        self.state.config.set_unwind_parameters(
            full_unwind_threshold_bps,
            unwind_buffer_bps,
            dust_threshold_value,
            max_unwind_iterations,
            swap_fallback_premium_bps,
        )
    }

    pub fn set_performance_fee(&mut self, performance_fee_bps: u16) -> Result<(), ProgramError> {
        self.state.config.set_performance_fee(performance_fee_bps)
    }

    /// Make at least `amount` of base asset idle, unwinding for the shortfall.
    /// Returns the idle balance afterwards, which may still fall short.
    fn release(&mut self, amount: u64) -> Result<u64, ProgramError> {
        let base_mint = self.state.assets.base_mint;
        let idle = self.env.balance_of(&base_mint)?;
        if idle >= amount {
            return Ok(idle);
        }

        let outcome = UnwindEngine::unwind(
            &mut self.env,
            &self.state.assets,
            &self.state.config,
            amount - idle,
        )?;
        msg!(
            "Unwind freed {} in {} rounds{}",
            outcome.freed,
            outcome.rounds.len(),
            if outcome.liquidity_starved { " (liquidity starved)" } else { "" }
        );

        self.env.balance_of(&base_mint)
    }

    fn mint(&mut self, holder: &Pubkey, shares: u128) -> Result<(), ProgramError> {
        self.state.total_shares = self
            .state
            .total_shares
            .checked_add(shares)
            .ok_or(VaultError::ArithmeticOverflow)?;
        let balance = self.holders.entry(*holder).or_insert(0);
        *balance = balance
            .checked_add(shares)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    fn burn(&mut self, holder: &Pubkey, shares: u128) -> Result<(), ProgramError> {
        let balance = self.shares_of(holder);
        if balance < shares {
            return Err(VaultError::InsufficientShares.into());
        }

        if balance == shares {
            self.holders.remove(holder);
        } else {
            self.holders.insert(*holder, balance - shares);
        }
        self.state.total_shares = self
            .state
            .total_shares
            .checked_sub(shares)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Run `operation` on a copy of the vault and adopt the copy only on success.
    fn staged<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<T, ProgramError>,
    ) -> Result<T, ProgramError> {
        let mut staged = self.clone();
        let result = operation(&mut staged)?;
        *self = staged;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math::PRICE_PRECISION, simulation::SimulatedMarket};

    fn vault() -> (LeveragedVault<SimulatedMarket>, Pubkey) {
        let assets = AssetPair {
            base_mint: Pubkey::new_unique(),
            base_decimals: 6,
            borrow_mint: Pubkey::new_unique(),
            borrow_decimals: 6,
        };
        let mut market = SimulatedMarket::new(&assets, PRICE_PRECISION, PRICE_PRECISION);
        let user = Pubkey::new_unique();
        market.mint_to(&user, &assets.base_mint, 100_000_000);

        let state = VaultState::new(Pubkey::new_unique(), assets, Pubkey::new_unique());
        let mut vault = LeveragedVault::new(market, state).unwrap();
        vault.set_strategy_parameters(7_000, 5, 100).unwrap();
        (vault, user)
    }

    #[test]
    fn test_new_rejects_outstanding_shares() {
        let (vault, _) = vault();
        let mut state = vault.state().clone();
        state.total_shares = 1;
        assert!(LeveragedVault::new(vault.env().clone(), state).is_err());
    }

    #[test]
    fn test_zero_inputs_rejected() {
        let (mut vault, user) = vault();
        assert_eq!(
            vault.deposit(&user, 0).unwrap_err(),
            ProgramError::from(VaultError::ZeroAmount)
        );
        assert_eq!(
            vault.withdraw(&user, &user, 0).unwrap_err(),
            ProgramError::from(VaultError::ZeroAmount)
        );
        assert_eq!(
            vault.redeem(&user, &user, 0).unwrap_err(),
            ProgramError::from(VaultError::ZeroShares)
        );
    }

    #[test]
    fn test_deposit_mints_and_caches() {
        let (mut vault, user) = vault();
        let shares = vault.deposit(&user, 10_000_000).unwrap();

        assert_eq!(shares, 1_000_000_000_000_000);
        assert_eq!(vault.shares_of(&user), shares);
        assert_eq!(vault.total_shares(), shares);
        assert_eq!(vault.state().cached_total_assets, 10_000_000);
        assert_eq!(vault.state().cached_collateral_value, 2_773_100_000);
        assert!(vault.state().cached_health_factor > vault.config().min_health_factor);
        assert!(!vault.is_bootstrap_phase());
    }

    #[test]
    fn test_withdraw_more_than_owned() {
        let (mut vault, user) = vault();
        vault.deposit(&user, 10_000_000).unwrap();
        let stranger = Pubkey::new_unique();
        assert_eq!(
            vault.withdraw(&stranger, &stranger, 1_000).unwrap_err(),
            ProgramError::from(VaultError::InsufficientShares)
        );
    }

    #[test]
    fn test_failed_deposit_leaves_no_trace() {
        let (mut vault, user) = vault();
        vault.env_mut().health_factor_override = Some(1_000_000);

        assert_eq!(
            vault.deposit(&user, 10_000_000).unwrap_err(),
            ProgramError::from(VaultError::HealthFactorBelowFloor)
        );
        let base_mint = vault.assets().base_mint;
        assert_eq!(vault.env().wallet_balance(&user, &base_mint), 100_000_000);
        assert_eq!(vault.env().collateral(), 0);
        assert_eq!(vault.env().debt(), 0);
        assert_eq!(vault.total_shares(), 0);
    }

    #[test]
    fn test_performance_fee_above_high_water_mark() {
        let (mut vault, user) = vault();
        let fee_recipient = vault.state().fee_recipient;
        vault.set_performance_fee(2_000).unwrap();
        vault.deposit(&user, 10_000_000).unwrap();

        assert_eq!(vault.accrue_performance_fee().unwrap(), 0);

        vault.env_mut().accrue_supply_yield(1_000).unwrap();
        let fee_shares = vault.accrue_performance_fee().unwrap();
        assert!(fee_shares > 0);
        assert_eq!(vault.shares_of(&fee_recipient), fee_shares);

        // 20% of the 2_773_100 gain
        let fee_value = vault.convert_to_assets(fee_shares).unwrap();
        assert!((550_000..=560_000).contains(&fee_value), "fee value {}", fee_value);

        assert_eq!(vault.accrue_performance_fee().unwrap(), 0);
    }
}
