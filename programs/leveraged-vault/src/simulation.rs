//! In-memory market implementing every collaborator trait.
//!
//! One lending book holding the vault's collateral and debt, an oracle price table, a swap
//! pool with unlimited depth that fills at the oracle rate minus a fee and a configurable
//! deviation, and token balances with allowances. Used for dry runs and tests.

use std::collections::BTreeMap;

use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::{
    error::VaultError,
    math::{amount_to_value, apply_bps, health_factor, value_to_amount, Rounding, BPS, ONE},
    state::{AccountData, AssetPair},
    venue::{LendingVenue, PriceOracle, SwapVenue, TokenTransfer},
};

pub const DEFAULT_LTV_BPS: u16 = 7_500;
pub const DEFAULT_LIQUIDATION_THRESHOLD_BPS: u16 = 8_000;

#[derive(Debug, Clone)]
pub struct SimulatedMarket {
    /// Owner of the position and of the balances the traits act on
    pub vault: Pubkey,
    pub lending_id: Pubkey,
    pub swap_id: Pubkey,
    pub collateral_asset: Pubkey,
    pub debt_asset: Pubkey,
    decimals: BTreeMap<Pubkey, u8>,
    prices: BTreeMap<Pubkey, u64>,
    balances: BTreeMap<(Pubkey, Pubkey), u64>,
    allowances: BTreeMap<(Pubkey, Pubkey), u64>,
    collateral: u64,
    debt: u64,
    pub ltv_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub swap_fee_bps: u16,
    /// Extra shortfall of every fill against the oracle rate
    pub swap_deviation_bps: u16,
    pub quotes_available: bool,
    pub swaps_available: bool,
    pub withdrawals_available: bool,
    /// Reported health factor, replacing the computed one when set
    pub health_factor_override: Option<u64>,
}

impl SimulatedMarket {
    pub fn new(assets: &AssetPair, base_price: u64, borrow_price: u64) -> Self {
        let mut decimals = BTreeMap::new();
        decimals.insert(assets.base_mint, assets.base_decimals);
        decimals.insert(assets.borrow_mint, assets.borrow_decimals);

        let mut prices = BTreeMap::new();
        prices.insert(assets.base_mint, base_price);
        prices.insert(assets.borrow_mint, borrow_price);

        Self {
            vault: Pubkey::new_unique(),
            lending_id: Pubkey::new_unique(),
            swap_id: Pubkey::new_unique(),
            collateral_asset: assets.base_mint,
            debt_asset: assets.borrow_mint,
            decimals,
            prices,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            collateral: 0,
            debt: 0,
            ltv_bps: DEFAULT_LTV_BPS,
            liquidation_threshold_bps: DEFAULT_LIQUIDATION_THRESHOLD_BPS,
            swap_fee_bps: 0,
            swap_deviation_bps: 0,
            quotes_available: true,
            swaps_available: true,
            withdrawals_available: true,
            health_factor_override: None,
        }
    }

    pub fn mint_to(&mut self, owner: &Pubkey, asset: &Pubkey, amount: u64) {
        let balance = self.balances.entry((*owner, *asset)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn wallet_balance(&self, owner: &Pubkey, asset: &Pubkey) -> u64 {
        self.balances.get(&(*owner, *asset)).copied().unwrap_or(0)
    }

    pub fn set_price(&mut self, asset: &Pubkey, price: u64) {
        self.prices.insert(*asset, price);
    }

    /// Supplied collateral in native units
    pub fn collateral(&self) -> u64 {
        self.collateral
    }

    /// Outstanding debt in native units
    pub fn debt(&self) -> u64 {
        self.debt
    }

    /// Grow the debt by `bps`, rounding against the borrower.
    pub fn accrue_interest(&mut self, bps: u16) -> Result<(), ProgramError> {
        let interest = apply_bps(self.debt, bps as u64, Rounding::Up)?;
        self.debt = self
            .debt
            .checked_add(interest)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Grow the supplied collateral by `bps`.
    pub fn accrue_supply_yield(&mut self, bps: u16) -> Result<(), ProgramError> {
        let earned = apply_bps(self.collateral, bps as u64, Rounding::Down)?;
        self.collateral = self
            .collateral
            .checked_add(earned)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    fn decimals_of(&self, asset: &Pubkey) -> Result<u8, ProgramError> {
        self.decimals
            .get(asset)
            .copied()
            .ok_or_else(|| VaultError::UnsupportedAsset.into())
    }

    fn price_of(&self, asset: &Pubkey) -> Result<u64, ProgramError> {
        self.prices
            .get(asset)
            .copied()
            .ok_or_else(|| VaultError::UnsupportedAsset.into())
    }

    fn value_of(&self, asset: &Pubkey, amount: u64) -> Result<u128, ProgramError> {
        amount_to_value(amount, self.price_of(asset)?, self.decimals_of(asset)?)
    }

    fn health_factor_for(&self, collateral: u64, debt: u64) -> Result<u64, ProgramError> {
        health_factor(
            self.value_of(&self.collateral_asset, collateral)?,
            self.value_of(&self.debt_asset, debt)?,
            self.liquidation_threshold_bps,
        )
    }

    fn require_asset(asset: &Pubkey, expected: &Pubkey) -> Result<(), ProgramError> {
        if asset != expected {
            return Err(VaultError::UnsupportedAsset.into());
        }
        Ok(())
    }

    fn require_balance(&self, owner: &Pubkey, asset: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        if self.wallet_balance(owner, asset) < amount {
            return Err(VaultError::InsufficientBalance.into());
        }
        Ok(())
    }

    fn require_allowance(&self, asset: &Pubkey, spender: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        let allowance = self.allowances.get(&(*asset, *spender)).copied().unwrap_or(0);
        if allowance < amount {
            return Err(VaultError::InsufficientAllowance.into());
        }
        Ok(())
    }

    fn debit(&mut self, owner: &Pubkey, asset: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        self.require_balance(owner, asset, amount)?;
        if let Some(balance) = self.balances.get_mut(&(*owner, *asset)) {
            *balance -= amount;
        }
        Ok(())
    }

    fn spend_allowance(&mut self, asset: &Pubkey, spender: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        self.require_allowance(asset, spender, amount)?;
        if let Some(allowance) = self.allowances.get_mut(&(*asset, *spender)) {
            *allowance -= amount;
        }
        Ok(())
    }

    /// Fill for `amount_in`: oracle conversion less fee and deviation.
    fn swap_output(
        &self,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u64,
    ) -> Result<u64, ProgramError> {
        let value = self.value_of(asset_in, amount_in)?;
        let fair = value_to_amount(
            value,
            self.price_of(asset_out)?,
            self.decimals_of(asset_out)?,
            Rounding::Down,
        )?;
        let haircut = self.swap_fee_bps as u64 + self.swap_deviation_bps as u64;
        apply_bps(fair, BPS.saturating_sub(haircut), Rounding::Down)
    }
}

impl LendingVenue for SimulatedMarket {
    fn lending_venue_id(&self) -> Pubkey {
        self.lending_id
    }

    fn supply(&mut self, asset: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        Self::require_asset(asset, &self.collateral_asset)?;
        let vault = self.vault;
        let spender = self.lending_id;
        self.require_balance(&vault, asset, amount)?;
        self.spend_allowance(asset, &spender, amount)?;
        self.debit(&vault, asset, amount)?;
        self.collateral = self
            .collateral
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    fn withdraw(&mut self, asset: &Pubkey, amount: u64) -> Result<u64, ProgramError> {
        Self::require_asset(asset, &self.collateral_asset)?;
        if !self.withdrawals_available {
            return Err(VaultError::VenueRejected.into());
        }

        let actual = amount.min(self.collateral);
        let remaining = self.collateral - actual;
        if self.debt > 0 && self.health_factor_for(remaining, self.debt)? < ONE {
            return Err(VaultError::VenueRejected.into());
        }

        self.collateral = remaining;
        let vault = self.vault;
        self.mint_to(&vault, asset, actual);
        Ok(actual)
    }

    fn borrow(&mut self, asset: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        Self::require_asset(asset, &self.debt_asset)?;
        let debt = self
            .debt
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;

        let borrowing_power = apply_bps(
            self.collateral,
            self.ltv_bps as u64,
            Rounding::Down,
        )?;
        let power_value = self.value_of(&self.collateral_asset, borrowing_power)?;
        if self.value_of(&self.debt_asset, debt)? > power_value {
            return Err(VaultError::VenueRejected.into());
        }

        self.debt = debt;
        let vault = self.vault;
        self.mint_to(&vault, asset, amount);
        Ok(())
    }

    fn repay(&mut self, asset: &Pubkey, amount: u64) -> Result<u64, ProgramError> {
        Self::require_asset(asset, &self.debt_asset)?;
        let actual = amount.min(self.debt);
        let vault = self.vault;
        let spender = self.lending_id;
        self.require_balance(&vault, asset, actual)?;
        self.spend_allowance(asset, &spender, actual)?;
        self.debit(&vault, asset, actual)?;
        self.debt -= actual;
        Ok(actual)
    }

    fn get_account_data(&self) -> Result<AccountData, ProgramError> {
        let total_collateral_value = self.value_of(&self.collateral_asset, self.collateral)?;
        let total_debt_value = self.value_of(&self.debt_asset, self.debt)?;
        let borrowing_power = total_collateral_value * self.ltv_bps as u128 / BPS as u128;

        let health_factor = match self.health_factor_override {
            Some(value) => value,
            None => self.health_factor_for(self.collateral, self.debt)?,
        };

        Ok(AccountData {
            total_collateral_value,
            total_debt_value,
            available_borrows_value: borrowing_power.saturating_sub(total_debt_value),
            liquidation_threshold_bps: self.liquidation_threshold_bps,
            ltv_bps: self.ltv_bps,
            health_factor,
        })
    }
}

impl PriceOracle for SimulatedMarket {
    fn get_price(&self, asset: &Pubkey) -> Result<u64, ProgramError> {
        self.price_of(asset)
    }
}

impl SwapVenue for SimulatedMarket {
    fn swap_venue_id(&self) -> Pubkey {
        self.swap_id
    }

    fn quote(
        &self,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u64,
    ) -> Result<u64, ProgramError> {
        if !self.quotes_available {
            return Err(VaultError::QuoteUnavailable.into());
        }
        self.swap_output(asset_in, asset_out, amount_in)
    }

    fn exchange(
        &mut self,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u64,
        min_out: u64,
    ) -> Result<u64, ProgramError> {
        if !self.swaps_available {
            return Err(VaultError::InsufficientLiquidity.into());
        }

        let amount_out = self.swap_output(asset_in, asset_out, amount_in)?;
        if amount_out < min_out {
            return Err(VaultError::SlippageExceeded.into());
        }

        let vault = self.vault;
        let spender = self.swap_id;
        self.require_balance(&vault, asset_in, amount_in)?;
        self.spend_allowance(asset_in, &spender, amount_in)?;
        self.debit(&vault, asset_in, amount_in)?;
        self.mint_to(&vault, asset_out, amount_out);
        Ok(amount_out)
    }
}

impl TokenTransfer for SimulatedMarket {
    fn balance_of(&self, asset: &Pubkey) -> Result<u64, ProgramError> {
        Ok(self.wallet_balance(&self.vault, asset))
    }

    fn transfer_in(&mut self, from: &Pubkey, asset: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        self.debit(from, asset, amount)?;
        let vault = self.vault;
        self.mint_to(&vault, asset, amount);
        Ok(())
    }

    fn transfer_out(&mut self, to: &Pubkey, asset: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        let vault = self.vault;
        self.debit(&vault, asset, amount)?;
        self.mint_to(to, asset, amount);
        Ok(())
    }

    fn approve(&mut self, asset: &Pubkey, spender: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        self.allowances.insert((*asset, *spender), amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PRICE_PRECISION;

    fn market() -> (SimulatedMarket, AssetPair) {
        let assets = AssetPair {
            base_mint: Pubkey::new_unique(),
            base_decimals: 6,
            borrow_mint: Pubkey::new_unique(),
            borrow_decimals: 6,
        };
        let mut market = SimulatedMarket::new(&assets, PRICE_PRECISION, PRICE_PRECISION);
        let vault = market.vault;
        market.mint_to(&vault, &assets.base_mint, 1_000_000);
        (market, assets)
    }

    #[test]
    fn test_supply_requires_allowance() {
        let (mut market, assets) = market();
        assert_eq!(
            market.supply(&assets.base_mint, 1_000_000).unwrap_err(),
            ProgramError::from(VaultError::InsufficientAllowance)
        );

        let lending = market.lending_id;
        market.approve(&assets.base_mint, &lending, 1_000_000).unwrap();
        market.supply(&assets.base_mint, 1_000_000).unwrap();
        assert_eq!(market.collateral(), 1_000_000);
        assert_eq!(market.balance_of(&assets.base_mint).unwrap(), 0);
    }

    #[test]
    fn test_borrow_limited_by_ltv() {
        let (mut market, assets) = market();
        let lending = market.lending_id;
        market.approve(&assets.base_mint, &lending, 1_000_000).unwrap();
        market.supply(&assets.base_mint, 1_000_000).unwrap();

        assert!(market.borrow(&assets.borrow_mint, 750_001).is_err());
        market.borrow(&assets.borrow_mint, 750_000).unwrap();

        let data = market.get_account_data().unwrap();
        assert_eq!(data.available_borrows_value, 0);
        // 1.0 collateral at 80% threshold over 0.75 debt
        assert_eq!(data.health_factor, 1_066_666);
    }

    #[test]
    fn test_withdraw_rejected_when_liquidatable() {
        let (mut market, assets) = market();
        let lending = market.lending_id;
        market.approve(&assets.base_mint, &lending, 1_000_000).unwrap();
        market.supply(&assets.base_mint, 1_000_000).unwrap();
        market.borrow(&assets.borrow_mint, 500_000).unwrap();

        assert!(market.withdraw(&assets.base_mint, 500_000).is_err());
        assert_eq!(market.withdraw(&assets.base_mint, 100_000).unwrap(), 100_000);
    }

    #[test]
    fn test_swap_applies_fee_and_min_out() {
        let (mut market, assets) = market();
        market.swap_fee_bps = 30;
        let swap = market.swap_id;
        market.approve(&assets.base_mint, &swap, 1_000_000).unwrap();

        let quoted = market.quote(&assets.base_mint, &assets.borrow_mint, 1_000_000).unwrap();
        assert_eq!(quoted, 997_000);
        assert_eq!(
            market
                .exchange(&assets.base_mint, &assets.borrow_mint, 1_000_000, 998_000)
                .unwrap_err(),
            ProgramError::from(VaultError::SlippageExceeded)
        );
        assert_eq!(
            market
                .exchange(&assets.base_mint, &assets.borrow_mint, 1_000_000, quoted)
                .unwrap(),
            997_000
        );
        assert_eq!(market.balance_of(&assets.borrow_mint).unwrap(), 997_000);
    }
}
