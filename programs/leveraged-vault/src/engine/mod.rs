//! Strategy engines: valuation, leverage construction and unwinding.
//!
//! Engines are stateless; everything they act on is passed in explicitly (the
//! collaborator environment, the asset pair and the strategy config).

use solana_program::{msg, program_error::ProgramError, pubkey::Pubkey};

use crate::{
    math::{amount_to_value, apply_bps, value_to_amount, Rounding, BPS},
    state::AssetPair,
    venue::{LendingVenue, PriceOracle, SwapVenue, TokenTransfer},
};

pub mod leverage_loop;
pub mod unwind;
pub mod valuation;

pub use leverage_loop::{LeverageLoopController, LoopOutcome};
pub use unwind::{UnwindEngine, UnwindOutcome, UnwindRound};
pub use valuation::{PositionValuation, PositionValuator};

/// Size halvings tried when a withdraw or swap step fails during an unwind
pub const BACKOFF_ATTEMPTS: u8 = 3;

pub(crate) fn base_value<O: PriceOracle + ?Sized>(
    oracle: &O,
    assets: &AssetPair,
    amount: u64,
) -> Result<u128, ProgramError> {
    let price = oracle.get_price(&assets.base_mint)?;
    amount_to_value(amount, price, assets.base_decimals)
}

pub(crate) fn value_in_base<O: PriceOracle + ?Sized>(
    oracle: &O,
    assets: &AssetPair,
    value: u128,
    rounding: Rounding,
) -> Result<u64, ProgramError> {
    let price = oracle.get_price(&assets.base_mint)?;
    value_to_amount(value, price, assets.base_decimals, rounding)
}

pub(crate) fn value_in_borrow<O: PriceOracle + ?Sized>(
    oracle: &O,
    assets: &AssetPair,
    value: u128,
    rounding: Rounding,
) -> Result<u64, ProgramError> {
    let price = oracle.get_price(&assets.borrow_mint)?;
    value_to_amount(value, price, assets.borrow_decimals, rounding)
}

/// Base-asset amount the oracle considers equal to `amount` of the borrowed asset.
pub(crate) fn borrow_in_base<O: PriceOracle + ?Sized>(
    oracle: &O,
    assets: &AssetPair,
    amount: u64,
    rounding: Rounding,
) -> Result<u64, ProgramError> {
    let price = oracle.get_price(&assets.borrow_mint)?;
    let value = amount_to_value(amount, price, assets.borrow_decimals)?;
    value_in_base(oracle, assets, value, rounding)
}

pub(crate) fn supply_collateral<E: LendingVenue + TokenTransfer>(
    env: &mut E,
    assets: &AssetPair,
    amount: u64,
) -> Result<(), ProgramError> {
    let spender = env.lending_venue_id();
    env.approve(&assets.base_mint, &spender, amount)?;
    env.supply(&assets.base_mint, amount)
}

pub(crate) fn repay_debt<E: LendingVenue + TokenTransfer>(
    env: &mut E,
    assets: &AssetPair,
    amount: u64,
) -> Result<u64, ProgramError> {
    if amount == 0 {
        return Ok(0);
    }
    let spender = env.lending_venue_id();
    env.approve(&assets.borrow_mint, &spender, amount)?;
    env.repay(&assets.borrow_mint, amount)
}

/// Quote, then execute with `min_out = quote * (1 - slippage)`. A zero quote is a
/// zero-output swap and executes nothing.
pub(crate) fn swap_exact_in<E: SwapVenue + TokenTransfer>(
    env: &mut E,
    asset_in: &Pubkey,
    asset_out: &Pubkey,
    amount_in: u64,
    slippage_tolerance_bps: u16,
) -> Result<u64, ProgramError> {
    if amount_in == 0 {
        return Ok(0);
    }
    let expected = env.quote(asset_in, asset_out, amount_in)?;
    if expected == 0 {
        return Ok(0);
    }
    let min_out = apply_bps(
        expected,
        BPS.saturating_sub(slippage_tolerance_bps as u64),
        Rounding::Down,
    )?;

    let spender = env.swap_venue_id();
    env.approve(asset_in, &spender, amount_in)?;
    env.exchange(asset_in, asset_out, amount_in, min_out)
}

/// Repay debt with whatever borrowed asset the vault holds. Returns the amount repaid.
pub(crate) fn settle_idle_borrow<E: LendingVenue + PriceOracle + TokenTransfer>(
    env: &mut E,
    assets: &AssetPair,
) -> Result<u64, ProgramError> {
    let idle = env.balance_of(&assets.borrow_mint)?;
    if idle == 0 {
        return Ok(0);
    }
    let data = env.get_account_data()?;
    if !data.has_debt() {
        return Ok(0);
    }
    let debt = value_in_borrow(&*env, assets, data.total_debt_value, Rounding::Up)?;
    repay_debt(env, assets, idle.min(debt))
}

/// Withdraw base collateral, halving the request after each venue rejection.
/// Returns zero when every attempt failed.
pub(crate) fn withdraw_with_backoff<E: LendingVenue>(
    env: &mut E,
    assets: &AssetPair,
    amount: u64,
) -> Result<u64, ProgramError> {
    let mut size = amount;
    for attempt in 0..BACKOFF_ATTEMPTS {
        if size == 0 {
            break;
        }
        match env.withdraw(&assets.base_mint, size) {
            Ok(withdrawn) => return Ok(withdrawn),
            Err(err) => {
                msg!("Withdraw of {} failed on attempt {}: {:?}", size, attempt, err);
                size /= 2;
            }
        }
    }
    Ok(0)
}

/// Swap with halving retries. Returns `(sold, received)`, both zero on failure.
pub(crate) fn swap_with_backoff<E: SwapVenue + TokenTransfer>(
    env: &mut E,
    asset_in: &Pubkey,
    asset_out: &Pubkey,
    amount_in: u64,
    slippage_tolerance_bps: u16,
) -> Result<(u64, u64), ProgramError> {
    let mut size = amount_in;
    for attempt in 0..BACKOFF_ATTEMPTS {
        if size == 0 {
            break;
        }
        match swap_exact_in(env, asset_in, asset_out, size, slippage_tolerance_bps) {
            Ok(received) if received > 0 => return Ok((size, received)),
            Ok(_) => msg!("Swap of {} returned nothing on attempt {}", size, attempt),
            Err(err) => msg!("Swap of {} failed on attempt {}: {:?}", size, attempt, err),
        }
        size /= 2;
    }
    Ok((0, 0))
}
