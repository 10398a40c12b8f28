use solana_program::program_error::ProgramError;

use crate::error::VaultError;

pub mod conversion;

pub use conversion::ShareMath;

/// Health factor precision (6 decimals), `ONE` is a health factor of 1.0
pub const ONE: u64 = 1_000_000;

/// Basis points denominator
pub const BPS: u64 = 10_000;

/// Oracle prices and venue values carry 8 decimals of the quote currency
pub const PRICE_PRECISION: u64 = 100_000_000;

/// Share price precision (18 decimals)
pub const SHARE_PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

impl Rounding {
    pub fn from_round_up(round_up: bool) -> Self {
        if round_up {
            Rounding::Up
        } else {
            Rounding::Down
        }
    }
}

/// `a * b / denominator` without intermediate overflow whenever the result fits in u128.
pub fn mul_div(
    a: u128,
    b: u128,
    denominator: u128,
    rounding: Rounding,
) -> Result<u128, ProgramError> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero.into());
    }

    let (quotient, inexact) = match a.checked_mul(b) {
        Some(product) => (product / denominator, product % denominator != 0),
        None => split_mul_div(a, b, denominator)
            .or_else(|| split_mul_div(b, a, denominator))
            .ok_or(VaultError::ArithmeticOverflow)?,
    };

    match rounding {
        Rounding::Up if inexact => quotient
            .checked_add(1)
            .ok_or_else(|| VaultError::ArithmeticOverflow.into()),
        _ => Ok(quotient),
    }
}

// floor(a * b / d) = (a / d) * b + floor((a % d) * b / d)
fn split_mul_div(a: u128, b: u128, denominator: u128) -> Option<(u128, bool)> {
    let whole = (a / denominator).checked_mul(b)?;
    let partial = (a % denominator).checked_mul(b)?;
    let quotient = whole.checked_add(partial / denominator)?;
    Some((quotient, partial % denominator != 0))
}

pub fn to_u64(value: u128) -> Result<u64, ProgramError> {
    u64::try_from(value).map_err(|_| VaultError::ArithmeticOverflow.into())
}

/// Scale `amount` by `bps / 10_000`.
pub fn apply_bps(amount: u64, bps: u64, rounding: Rounding) -> Result<u64, ProgramError> {
    to_u64(mul_div(amount as u128, bps as u128, BPS as u128, rounding)?)
}

fn decimals_factor(decimals: u8) -> Result<u128, ProgramError> {
    10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| VaultError::ArithmeticOverflow.into())
}

/// Quote-currency value of `amount` native units priced at `price` per whole token.
pub fn amount_to_value(amount: u64, price: u64, decimals: u8) -> Result<u128, ProgramError> {
    mul_div(
        amount as u128,
        price as u128,
        decimals_factor(decimals)?,
        Rounding::Down,
    )
}

/// Native units worth `value` at `price` per whole token.
pub fn value_to_amount(
    value: u128,
    price: u64,
    decimals: u8,
    rounding: Rounding,
) -> Result<u64, ProgramError> {
    if price == 0 {
        return Err(VaultError::InvalidOraclePrice.into());
    }
    to_u64(mul_div(
        value,
        decimals_factor(decimals)?,
        price as u128,
        rounding,
    )?)
}

/// Health factor in `ONE` precision; a debt-free account reports `u64::MAX`.
pub fn health_factor(
    collateral_value: u128,
    debt_value: u128,
    liquidation_threshold_bps: u16,
) -> Result<u64, ProgramError> {
    if debt_value == 0 {
        return Ok(u64::MAX);
    }
    let weighted = mul_div(
        collateral_value,
        liquidation_threshold_bps as u128,
        BPS as u128,
        Rounding::Down,
    )?;
    let hf = mul_div(weighted, ONE as u128, debt_value, Rounding::Down)?;
    Ok(hf.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div(10, 10, 3, Rounding::Down).unwrap(), 33);
        assert_eq!(mul_div(10, 10, 3, Rounding::Up).unwrap(), 34);
        assert_eq!(mul_div(10, 9, 3, Rounding::Up).unwrap(), 30);
    }

    #[test]
    fn test_mul_div_survives_wide_products() {
        let a = u128::MAX / 2;
        // a * 4 overflows but a * 4 / 8 does not
        assert_eq!(mul_div(a, 4, 8, Rounding::Down).unwrap(), a / 2);
        assert_eq!(mul_div(4, a, 8, Rounding::Down).unwrap(), a / 2);
    }

    #[test]
    fn test_mul_div_reports_overflow() {
        assert_eq!(
            mul_div(u128::MAX, u128::MAX, 1, Rounding::Down),
            Err(VaultError::ArithmeticOverflow.into())
        );
        assert_eq!(
            mul_div(1, 1, 0, Rounding::Down),
            Err(VaultError::DivisionByZero.into())
        );
    }

    #[test]
    fn test_value_conversions() {
        // 2.5 tokens with 6 decimals at $2,000
        let value = amount_to_value(2_500_000, 2_000 * PRICE_PRECISION, 6).unwrap();
        assert_eq!(value, 5_000 * PRICE_PRECISION as u128);
        assert_eq!(
            value_to_amount(value, 2_000 * PRICE_PRECISION, 6, Rounding::Down).unwrap(),
            2_500_000
        );
        assert_eq!(
            value_to_amount(value, 0, 6, Rounding::Down),
            Err(VaultError::InvalidOraclePrice.into())
        );
    }

    #[test]
    fn test_health_factor() {
        assert_eq!(health_factor(100, 0, 8_000).unwrap(), u64::MAX);
        // 100 collateral at 80% against 50 debt = 1.6
        assert_eq!(health_factor(100, 50, 8_000).unwrap(), 1_600_000);
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(1_000, 9_900, Rounding::Down).unwrap(), 990);
        assert_eq!(apply_bps(1_001, 5_000, Rounding::Up).unwrap(), 501);
    }
}
