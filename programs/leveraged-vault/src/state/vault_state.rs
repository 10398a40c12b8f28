use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use super::StrategyConfig;
use crate::{error::VaultError, math::SHARE_PRICE_SCALE};

/// The base (collateral) asset and the borrowed asset of the strategy
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetPair {
    pub base_mint: Pubkey,
    pub base_decimals: u8,
    pub borrow_mint: Pubkey,
    pub borrow_decimals: u8,
}

impl AssetPair {
    pub const LEN: usize = 32 + 1 + 32 + 1;
}

/// Persisted vault account: share supply, cached position totals and strategy config
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultState {
    /// Account discriminator
    pub discriminator: [u8; 8],

    /// Is initialized flag
    pub is_initialized: bool,

    /// Authority that can update parameters
    pub authority: Pubkey,

    pub assets: AssetPair,

    pub config: StrategyConfig,

    /// Receives performance fee shares
    pub fee_recipient: Pubkey,

    /// Outstanding ownership shares
    pub total_shares: u128,

    /// Net value at the last refresh (base asset units)
    pub cached_total_assets: u64,

    /// Venue-reported collateral at the last refresh (quote units, 8 decimals)
    pub cached_collateral_value: u128,

    /// Venue-reported debt at the last refresh (quote units, 8 decimals)
    pub cached_debt_value: u128,

    /// Health factor at the last refresh (fixed point 6 decimals)
    pub cached_health_factor: u64,

    /// Share price above which performance fees accrue (SHARE_PRICE_SCALE)
    pub high_water_mark: u128,

    /// Last update timestamp
    pub last_update: i64,
}

impl VaultState {
    pub const DISCRIMINATOR: [u8; 8] = [76, 69, 86, 95, 86, 65, 76, 84]; // "LEV_VALT"

    pub const LEN: usize = 8 + // discriminator
        1 + // is_initialized
        32 + // authority
        AssetPair::LEN +
        StrategyConfig::LEN +
        32 + // fee_recipient
        16 + // total_shares
        8 + // cached_total_assets
        16 + // cached_collateral_value
        16 + // cached_debt_value
        8 + // cached_health_factor
        16 + // high_water_mark
        8; // last_update

    pub fn new(authority: Pubkey, assets: AssetPair, fee_recipient: Pubkey) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            authority,
            assets,
            config: StrategyConfig::default(),
            fee_recipient,
            total_shares: 0,
            cached_total_assets: 0,
            cached_collateral_value: 0,
            cached_debt_value: 0,
            cached_health_factor: u64::MAX,
            high_water_mark: SHARE_PRICE_SCALE,
            last_update: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.discriminator != Self::DISCRIMINATOR {
            return Err(ProgramError::InvalidAccountData);
        }

        if !self.is_initialized {
            return Err(VaultError::AccountNotInitialized.into());
        }

        if self.assets.base_mint == self.assets.borrow_mint {
            return Err(VaultError::UnsupportedAsset.into());
        }

        self.config.validate()
    }

    /// Read and validate the state stored in an account's data.
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        let state = Self::deserialize(&mut &data[..]).map_err(|_| ProgramError::InvalidAccountData)?;
        state.validate()?;
        Ok(state)
    }

    pub fn pack(&self, data: &mut [u8]) -> Result<(), ProgramError> {
        if data.len() < Self::LEN {
            return Err(ProgramError::AccountDataTooSmall);
        }
        self.serialize(&mut &mut data[..])
            .map_err(|_| ProgramError::InvalidAccountData)
    }

    /// True when the account bytes already hold a vault.
    pub fn is_initialized_data(data: &[u8]) -> bool {
        data.len() > 8 && data[..8] == Self::DISCRIMINATOR && data[8] == 1
    }
}
