use solana_program::{msg, program_error::ProgramError};

use super::{base_value, supply_collateral, swap_exact_in, value_in_borrow};
use crate::{
    error::VaultError,
    math::{mul_div, Rounding, BPS},
    state::{AssetPair, StrategyConfig},
    venue::Venues,
};

/// What a leverage build actually achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopOutcome {
    /// Supply steps performed
    pub iterations: u8,
    pub total_supplied: u64,
    pub total_borrowed: u64,
    /// Borrowed tokens left unswapped in the vault (the final borrow, or one whose swap failed)
    pub idle_borrowed: u64,
    pub health_factor: u64,
}

/// Builds the leveraged position with supply -> borrow -> swap cycles
pub struct LeverageLoopController;

impl LeverageLoopController {
    /// Run up to `loop_count` cycles starting from `initial_amount` of idle base asset.
    /// Venue shortfalls end the build early; a post-loop health factor below the floor
    /// fails the call so the caller can discard everything it staged.
    pub fn execute_loops<E: Venues>(
        env: &mut E,
        assets: &AssetPair,
        config: &StrategyConfig,
        initial_amount: u64,
    ) -> Result<LoopOutcome, ProgramError> {
        let mut outcome = LoopOutcome::default();
        if initial_amount == 0 {
            return Ok(outcome);
        }

        let mut collateral_amount = initial_amount;

        for iteration in 0..config.loop_count {
            supply_collateral(env, assets, collateral_amount)?;
            outcome.iterations = iteration + 1;
            outcome.total_supplied = outcome.total_supplied.saturating_add(collateral_amount);

            let borrow_amount = Self::borrow_amount(&*env, assets, config, collateral_amount)?;
            if borrow_amount == 0 {
                msg!("Loop {}: nothing to borrow, stopping", iteration);
                break;
            }

            if let Err(err) = env.borrow(&assets.borrow_mint, borrow_amount) {
                msg!("Loop {}: borrow of {} rejected: {:?}", iteration, borrow_amount, err);
                break;
            }
            outcome.total_borrowed = outcome.total_borrowed.saturating_add(borrow_amount);

            // Last round keeps the borrowed asset idle
            if iteration + 1 == config.loop_count {
                outcome.idle_borrowed = borrow_amount;
                break;
            }

            match swap_exact_in(
                env,
                &assets.borrow_mint,
                &assets.base_mint,
                borrow_amount,
                config.slippage_tolerance_bps,
            ) {
                Ok(received) if received > 0 => {
                    msg!(
                        "Loop {}: supplied {}, borrowed {}, swapped into {}",
                        iteration,
                        collateral_amount,
                        borrow_amount,
                        received
                    );
                    collateral_amount = received;
                }
                Ok(_) => {
                    msg!("Loop {}: swap returned nothing, stopping", iteration);
                    outcome.idle_borrowed = borrow_amount;
                    break;
                }
                Err(err) => {
                    msg!("Loop {}: swap failed: {:?}", iteration, err);
                    outcome.idle_borrowed = borrow_amount;
                    break;
                }
            }
        }

        let data = env.get_account_data()?;
        outcome.health_factor = data.health_factor;

        if data.has_debt() && data.health_factor < config.min_health_factor {
            msg!(
                "Health factor {} below floor {} after {} loops",
                data.health_factor,
                config.min_health_factor,
                outcome.iterations
            );
            return Err(VaultError::HealthFactorBelowFloor.into());
        }

        Ok(outcome)
    }

    /// Borrowed-asset amount worth `target_ltv` of `collateral_amount`, clamped to what
    /// the venue still lends.
    fn borrow_amount<E: Venues>(
        env: &E,
        assets: &AssetPair,
        config: &StrategyConfig,
        collateral_amount: u64,
    ) -> Result<u64, ProgramError> {
        let collateral_value = base_value(env, assets, collateral_amount)?;
        let borrow_value = mul_div(
            collateral_value,
            config.target_ltv_bps as u128,
            BPS as u128,
            Rounding::Down,
        )?;
        let wanted = value_in_borrow(env, assets, borrow_value, Rounding::Down)?;

        let available_value = env.get_account_data()?.available_borrows_value;
        let available = value_in_borrow(env, assets, available_value, Rounding::Down)?;

        Ok(wanted.min(available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::{ONE, PRICE_PRECISION},
        simulation::SimulatedMarket,
        venue::{LendingVenue, TokenTransfer},
    };
    use solana_program::pubkey::Pubkey;

    const DEPOSIT: u64 = 10_000_000;

    fn setup() -> (SimulatedMarket, AssetPair, StrategyConfig) {
        let assets = AssetPair {
            base_mint: Pubkey::new_unique(),
            base_decimals: 6,
            borrow_mint: Pubkey::new_unique(),
            borrow_decimals: 6,
        };
        let mut market = SimulatedMarket::new(&assets, PRICE_PRECISION, PRICE_PRECISION);
        let vault = market.vault;
        market.mint_to(&vault, &assets.base_mint, DEPOSIT);
        let mut config = StrategyConfig::default();
        config.set_parameters(7_000, 5, 100).unwrap();
        (market, assets, config)
    }

    #[test]
    fn test_zero_amount_is_noop() {
        let (mut market, assets, config) = setup();
        let outcome =
            LeverageLoopController::execute_loops(&mut market, &assets, &config, 0).unwrap();
        assert_eq!(outcome, LoopOutcome::default());
        assert_eq!(market.collateral(), 0);
    }

    #[test]
    fn test_leverage_stays_within_bounds() {
        let (mut market, assets, config) = setup();
        let outcome =
            LeverageLoopController::execute_loops(&mut market, &assets, &config, DEPOSIT).unwrap();

        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.total_supplied, 27_731_000);
        assert_eq!(outcome.total_borrowed, 19_411_700);
        assert_eq!(outcome.idle_borrowed, 1_680_700);
        assert_eq!(market.balance_of(&assets.borrow_mint).unwrap(), 1_680_700);

        let ratio = market.collateral() as f64 / DEPOSIT as f64;
        assert!((2.5..=3.5).contains(&ratio), "leverage {}", ratio);
        assert!(outcome.health_factor > config.min_health_factor);
    }

    #[test]
    fn test_health_factor_gate() {
        let (mut market, assets, config) = setup();
        market.health_factor_override = Some(ONE);

        let result = LeverageLoopController::execute_loops(&mut market, &assets, &config, DEPOSIT);
        assert_eq!(
            result.unwrap_err(),
            ProgramError::from(VaultError::HealthFactorBelowFloor)
        );
    }

    #[test]
    fn test_swap_failure_stops_early() {
        let (mut market, assets, config) = setup();
        market.swaps_available = false;

        let outcome =
            LeverageLoopController::execute_loops(&mut market, &assets, &config, DEPOSIT).unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.total_borrowed, 7_000_000);
        assert_eq!(outcome.idle_borrowed, 7_000_000);
        assert_eq!(market.collateral(), DEPOSIT);
    }

    #[test]
    fn test_borrow_clamped_to_available() {
        let (mut market, assets, mut config) = setup();
        // Venue lends at most 50% while the strategy targets 70%
        market.ltv_bps = 5_000;
        config.set_parameters(7_000, 1, 100).unwrap();

        let outcome =
            LeverageLoopController::execute_loops(&mut market, &assets, &config, DEPOSIT).unwrap();
        assert_eq!(outcome.total_borrowed, 5_000_000);
        assert_eq!(market.debt(), 5_000_000);
        assert!(market.get_account_data().unwrap().health_factor > config.min_health_factor);
    }
}
