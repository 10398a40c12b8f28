//! Share/asset conversion with virtual offsets.
//!
//! Every conversion adds `share_offset` to the share supply and `asset_offset` to the
//! managed assets. The large share offset makes the starting exchange rate steep enough
//! that donating assets to an empty or near-empty pool costs the donor far more than it
//! can extract from the next depositor.

use solana_program::program_error::ProgramError;

use super::{mul_div, to_u64, Rounding, SHARE_PRICE_SCALE};

pub const VIRTUAL_SHARE_OFFSET: u128 = 100_000_000;
pub const VIRTUAL_ASSET_OFFSET: u128 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareMath {
    pub share_offset: u128,
    pub asset_offset: u128,
}

impl Default for ShareMath {
    fn default() -> Self {
        Self {
            share_offset: VIRTUAL_SHARE_OFFSET,
            asset_offset: VIRTUAL_ASSET_OFFSET,
        }
    }
}

impl ShareMath {
    /// Shares worth `assets`. Truncation (`round_up = false`) favors the pool.
    pub fn to_shares(
        &self,
        assets: u64,
        total_shares: u128,
        total_assets: u64,
        round_up: bool,
    ) -> Result<u128, ProgramError> {
        if assets == 0 {
            return Ok(0);
        }
        mul_div(
            assets as u128,
            self.virtual_shares(total_shares),
            self.virtual_assets(total_assets),
            Rounding::from_round_up(round_up),
        )
    }

    /// Assets backing `shares`.
    pub fn to_assets(
        &self,
        shares: u128,
        total_shares: u128,
        total_assets: u64,
        round_up: bool,
    ) -> Result<u64, ProgramError> {
        if shares == 0 {
            return Ok(0);
        }
        to_u64(mul_div(
            shares,
            self.virtual_assets(total_assets),
            self.virtual_shares(total_shares),
            Rounding::from_round_up(round_up),
        )?)
    }

    /// Assets per share scaled by `SHARE_PRICE_SCALE`; an empty pool reports 1.0.
    pub fn share_price(&self, total_shares: u128, total_assets: u64) -> Result<u128, ProgramError> {
        if total_shares == 0 {
            return Ok(SHARE_PRICE_SCALE);
        }
        mul_div(
            self.virtual_assets(total_assets),
            SHARE_PRICE_SCALE,
            self.virtual_shares(total_shares),
            Rounding::Down,
        )
    }

    /// True until real shares outnumber the virtual ones.
    pub fn is_bootstrap_phase(&self, total_shares: u128) -> bool {
        total_shares < self.share_offset
    }

    /// Minimum donation needed to push the share price to `target_ratio`
    /// (in `SHARE_PRICE_SCALE`). Zero when the price is already there.
    pub fn estimate_attack_cost(
        &self,
        target_ratio: u128,
        total_shares: u128,
        total_assets: u64,
    ) -> Result<u128, ProgramError> {
        let required = mul_div(
            target_ratio,
            self.virtual_shares(total_shares),
            SHARE_PRICE_SCALE,
            Rounding::Down,
        )?;
        Ok(required.saturating_sub(self.virtual_assets(total_assets)))
    }

    fn virtual_shares(&self, total_shares: u128) -> u128 {
        total_shares.saturating_add(self.share_offset)
    }

    fn virtual_assets(&self, total_assets: u64) -> u128 {
        (total_assets as u128).saturating_add(self.asset_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn math() -> ShareMath {
        ShareMath::default()
    }

    #[test]
    fn test_zero_short_circuits() {
        let m = math();
        assert_eq!(m.to_shares(0, 123, 456, true).unwrap(), 0);
        assert_eq!(m.to_assets(0, 123, 456, true).unwrap(), 0);
    }

    #[test]
    fn test_first_deposit_uses_virtual_rate() {
        let m = math();
        assert_eq!(m.to_shares(10, 0, 0, false).unwrap(), 10 * VIRTUAL_SHARE_OFFSET);
    }

    #[test]
    fn test_round_trip_never_gains() {
        let m = math();
        let totals = [
            (0u128, 0u64),
            (1, 1),
            (1_000_000_000_000_000, 10_000_000),
            (7_777_777_777, 1_234_567),
            (3, 1_000_000_000),
        ];
        let amounts = [1u64, 7, 999, 1_000_003, 123_456_789_012];

        for &(ts, ta) in totals.iter() {
            for &assets in amounts.iter() {
                let shares = m.to_shares(assets, ts, ta, false).unwrap();
                let back = m.to_assets(shares, ts, ta, false).unwrap();
                assert!(back <= assets, "ts={} ta={} assets={} back={}", ts, ta, assets, back);
            }
        }
    }

    #[test]
    fn test_round_up_is_at_most_one_unit_higher() {
        let m = math();
        let (ts, ta) = (1_000_000_000_000_007u128, 10_000_003u64);
        for shares in [1u128, 99_999_999, 100_000_001, 55_555_555_555] {
            let down = m.to_assets(shares, ts, ta, false).unwrap();
            let up = m.to_assets(shares, ts, ta, true).unwrap();
            assert!(up >= down);
            assert!(up - down <= 1);
        }
        // exact division does not round up
        assert_eq!(
            m.to_assets(2 * VIRTUAL_SHARE_OFFSET, 0, 0, true).unwrap(),
            m.to_assets(2 * VIRTUAL_SHARE_OFFSET, 0, 0, false).unwrap()
        );
    }

    #[test]
    fn test_donation_attack_is_unprofitable() {
        let m = math();
        // Attacker holds the only share, then donates 100,000 units
        let total_shares = 1u128;
        let total_assets = 1u64 + 100_000;

        let honest_deposit = 1_000u64;
        let honest_shares = m
            .to_shares(honest_deposit, total_shares, total_assets, false)
            .unwrap();
        assert!(honest_shares > 0);

        let total_shares = total_shares + honest_shares;
        let total_assets = total_assets + honest_deposit;
        let redeemable = m
            .to_assets(honest_shares, total_shares, total_assets, false)
            .unwrap();
        assert!(redeemable * 10 > honest_deposit * 9);

        // The attacker cannot recover the donation
        let attacker = m.to_assets(1, total_shares, total_assets, false).unwrap();
        assert!(attacker < 100_000);
    }

    #[test]
    fn test_share_price() {
        let m = math();
        assert_eq!(m.share_price(0, 0).unwrap(), SHARE_PRICE_SCALE);
        // 1e15 shares backing 1e7 assets: (1e7 + 1) / (1e15 + 1e8) per share
        let price = m.share_price(1_000_000_000_000_000, 10_000_000).unwrap();
        assert_eq!(price, 10_000_000_000);
    }

    #[test]
    fn test_bootstrap_phase() {
        let m = math();
        assert!(m.is_bootstrap_phase(0));
        assert!(m.is_bootstrap_phase(VIRTUAL_SHARE_OFFSET - 1));
        assert!(!m.is_bootstrap_phase(VIRTUAL_SHARE_OFFSET));
    }

    #[test]
    fn test_attack_cost() {
        let m = math();
        // 2 assets per share across the 1e8 virtual shares of an empty pool
        let cost = m.estimate_attack_cost(2 * SHARE_PRICE_SCALE, 0, 0).unwrap();
        assert_eq!(cost, 2 * VIRTUAL_SHARE_OFFSET - VIRTUAL_ASSET_OFFSET);
        // Already above target
        assert_eq!(m.estimate_attack_cost(0, 0, 1_000).unwrap(), 0);
    }
}
