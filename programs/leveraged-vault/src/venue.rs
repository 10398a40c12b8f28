//! Collaborator interfaces consumed by the strategy core.
//!
//! Each trait covers one external capability. Engines are generic over the capabilities
//! they touch; anything implementing all four is a [`Venues`] environment the vault can
//! drive. Methods act on behalf of the vault: balances, allowances and positions are the
//! vault's own.

use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::state::AccountData;

/// Collateral/debt bookkeeping at the lending venue
pub trait LendingVenue {
    /// Address that must be approved to pull tokens for `supply` and `repay`
    fn lending_venue_id(&self) -> Pubkey;

    fn supply(&mut self, asset: &Pubkey, amount: u64) -> Result<(), ProgramError>;

    /// Returns the amount actually withdrawn
    fn withdraw(&mut self, asset: &Pubkey, amount: u64) -> Result<u64, ProgramError>;

    fn borrow(&mut self, asset: &Pubkey, amount: u64) -> Result<(), ProgramError>;

    /// Returns the amount actually repaid
    fn repay(&mut self, asset: &Pubkey, amount: u64) -> Result<u64, ProgramError>;

    fn get_account_data(&self) -> Result<AccountData, ProgramError>;
}

/// Spot prices in quote currency per whole token, 8 decimals
pub trait PriceOracle {
    fn get_price(&self, asset: &Pubkey) -> Result<u64, ProgramError>;
}

/// Exact-input exchange between two assets
pub trait SwapVenue {
    /// Address that must be approved to pull the input asset
    fn swap_venue_id(&self) -> Pubkey;

    fn quote(
        &self,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u64,
    ) -> Result<u64, ProgramError>;

    /// Fails when the output would fall below `min_out`
    fn exchange(
        &mut self,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u64,
        min_out: u64,
    ) -> Result<u64, ProgramError>;
}

/// Token custody of the vault
pub trait TokenTransfer {
    fn balance_of(&self, asset: &Pubkey) -> Result<u64, ProgramError>;

    /// Pull `amount` from `from` into the vault
    fn transfer_in(&mut self, from: &Pubkey, asset: &Pubkey, amount: u64)
        -> Result<(), ProgramError>;

    /// Send `amount` from the vault to `to`
    fn transfer_out(&mut self, to: &Pubkey, asset: &Pubkey, amount: u64)
        -> Result<(), ProgramError>;

    /// Allow `spender` to pull up to `amount` of the vault's `asset`
    fn approve(&mut self, asset: &Pubkey, spender: &Pubkey, amount: u64)
        -> Result<(), ProgramError>;
}

/// Everything the vault needs from the outside world
pub trait Venues: LendingVenue + PriceOracle + SwapVenue + TokenTransfer {}

impl<T> Venues for T where T: LendingVenue + PriceOracle + SwapVenue + TokenTransfer {}
