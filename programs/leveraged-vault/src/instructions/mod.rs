use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum VaultInstruction {
    /// Create the vault account with default strategy parameters
    /// Accounts:
    /// 0. `[signer, writable]` Authority (pays for the account)
    /// 1. `[signer, writable]` Vault account
    /// 2. `[]` System program
    /// 3. `[]` Rent sysvar
    InitializeVault {
        base_mint: Pubkey,
        base_decimals: u8,
        borrow_mint: Pubkey,
        borrow_decimals: u8,
        fee_recipient: Pubkey,
    },

    /// Update the leverage loop parameters
    /// Accounts:
    /// 0. `[signer]` Authority
    /// 1. `[writable]` Vault account
    SetStrategyParameters {
        target_ltv_bps: u16,
        loop_count: u8,
        slippage_tolerance_bps: u16,
    },

    /// Update the LTV ceiling and health factor floor
    /// Accounts:
    /// 0. `[signer]` Authority
    /// 1. `[writable]` Vault account
    SetRiskParameters {
        max_ltv_bps: u16,
        min_health_factor: u64,
    },

    /// Update the unwind tunables
    /// Accounts:
    /// 0. `[signer]` Authority
    /// 1. `[writable]` Vault account
    SetUnwindParameters {
        full_unwind_threshold_bps: u16,
        unwind_buffer_bps: u16,
        dust_threshold_value: u64,
        max_unwind_iterations: u8,
        swap_fallback_premium_bps: u16,
    },

    /// Update the performance fee
    /// Accounts:
    /// 0. `[signer]` Authority
    /// 1. `[writable]` Vault account
    SetPerformanceFee {
        performance_fee_bps: u16,
    },
}

impl VaultInstruction {
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (&variant, rest) = input
            .split_first()
            .ok_or(ProgramError::InvalidInstructionData)?;

        Ok(match variant {
            0 => {
                let payload: InitializeVaultPayload = decode(rest)?;
                Self::InitializeVault {
                    base_mint: payload.base_mint,
                    base_decimals: payload.base_decimals,
                    borrow_mint: payload.borrow_mint,
                    borrow_decimals: payload.borrow_decimals,
                    fee_recipient: payload.fee_recipient,
                }
            }
            1 => {
                let payload: SetStrategyParametersPayload = decode(rest)?;
                Self::SetStrategyParameters {
                    target_ltv_bps: payload.target_ltv_bps,
                    loop_count: payload.loop_count,
                    slippage_tolerance_bps: payload.slippage_tolerance_bps,
                }
            }
            2 => {
                let payload: SetRiskParametersPayload = decode(rest)?;
                Self::SetRiskParameters {
                    max_ltv_bps: payload.max_ltv_bps,
                    min_health_factor: payload.min_health_factor,
                }
            }
            3 => {
                let payload: SetUnwindParametersPayload = decode(rest)?;
                Self::SetUnwindParameters {
                    full_unwind_threshold_bps: payload.full_unwind_threshold_bps,
                    unwind_buffer_bps: payload.unwind_buffer_bps,
                    dust_threshold_value: payload.dust_threshold_value,
                    max_unwind_iterations: payload.max_unwind_iterations,
                    swap_fallback_premium_bps: payload.swap_fallback_premium_bps,
                }
            }
            4 => {
                let payload: SetPerformanceFeePayload = decode(rest)?;
                Self::SetPerformanceFee {
                    performance_fee_bps: payload.performance_fee_bps,
                }
            }
            _ => return Err(ProgramError::InvalidInstructionData),
        })
    }

    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        self.try_to_vec()
            .map_err(|_| ProgramError::InvalidInstructionData)
    }
}

fn decode<T: BorshDeserialize>(data: &[u8]) -> Result<T, ProgramError> {
    T::try_from_slice(data).map_err(|_| ProgramError::InvalidInstructionData)
}

// Payload structs mirror the variant fields in order
#[derive(BorshSerialize, BorshDeserialize)]
struct InitializeVaultPayload {
    base_mint: Pubkey,
    base_decimals: u8,
    borrow_mint: Pubkey,
    borrow_decimals: u8,
    fee_recipient: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SetStrategyParametersPayload {
    target_ltv_bps: u16,
    loop_count: u8,
    slippage_tolerance_bps: u16,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SetRiskParametersPayload {
    max_ltv_bps: u16,
    min_health_factor: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SetUnwindParametersPayload {
    full_unwind_threshold_bps: u16,
    unwind_buffer_bps: u16,
    dust_threshold_value: u64,
    max_unwind_iterations: u8,
    swap_fallback_premium_bps: u16,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SetPerformanceFeePayload {
    performance_fee_bps: u16,
}

// Helper functions to create instructions
#[allow(clippy::too_many_arguments)]
pub fn initialize_vault(
    program_id: &Pubkey,
    authority: &Pubkey,
    vault: &Pubkey,
    base_mint: &Pubkey,
    base_decimals: u8,
    borrow_mint: &Pubkey,
    borrow_decimals: u8,
    fee_recipient: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new(*authority, true),
        AccountMeta::new(*vault, true),
        AccountMeta::new_readonly(solana_program::system_program::id(), false),
        AccountMeta::new_readonly(solana_program::sysvar::rent::id(), false),
    ];

    let data = VaultInstruction::InitializeVault {
        base_mint: *base_mint,
        base_decimals,
        borrow_mint: *borrow_mint,
        borrow_decimals,
        fee_recipient: *fee_recipient,
    };

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data: data.pack()?,
    })
}

fn authority_instruction(
    program_id: &Pubkey,
    authority: &Pubkey,
    vault: &Pubkey,
    data: VaultInstruction,
) -> Result<Instruction, ProgramError> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*vault, false),
        ],
        data: data.pack()?,
    })
}

pub fn set_strategy_parameters(
    program_id: &Pubkey,
    authority: &Pubkey,
    vault: &Pubkey,
    target_ltv_bps: u16,
    loop_count: u8,
    slippage_tolerance_bps: u16,
) -> Result<Instruction, ProgramError> {
    authority_instruction(
        program_id,
        authority,
        vault,
        VaultInstruction::SetStrategyParameters {
            target_ltv_bps,
            loop_count,
            slippage_tolerance_bps,
        },
    )
}

pub fn set_risk_parameters(
    program_id: &Pubkey,
    authority: &Pubkey,
    vault: &Pubkey,
    max_ltv_bps: u16,
    min_health_factor: u64,
) -> Result<Instruction, ProgramError> {
    authority_instruction(
        program_id,
        authority,
        vault,
        VaultInstruction::SetRiskParameters {
            max_ltv_bps,
            min_health_factor,
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub fn set_unwind_parameters(
    program_id: &Pubkey,
    authority: &Pubkey,
    vault: &Pubkey,
    full_unwind_threshold_bps: u16,
    unwind_buffer_bps: u16,
    dust_threshold_value: u64,
    max_unwind_iterations: u8,
    swap_fallback_premium_bps: u16,
) -> Result<Instruction, ProgramError> {
    authority_instruction(
        program_id,
        authority,
        vault,
        VaultInstruction::SetUnwindParameters {
            full_unwind_threshold_bps,
            unwind_buffer_bps,
            dust_threshold_value,
            max_unwind_iterations,
            swap_fallback_premium_bps,
        },
    )
}

pub fn set_performance_fee(
    program_id: &Pubkey,
    authority: &Pubkey,
    vault: &Pubkey,
    performance_fee_bps: u16,
) -> Result<Instruction, ProgramError> {
    authority_instruction(
        program_id,
        authority,
        vault,
        VaultInstruction::SetPerformanceFee { performance_fee_bps },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_matches_enum_encoding() {
        let instruction = VaultInstruction::SetUnwindParameters {
            full_unwind_threshold_bps: 9_000,
            unwind_buffer_bps: 11_500,
            dust_threshold_value: 50_000_000,
            max_unwind_iterations: 12,
            swap_fallback_premium_bps: 500,
        };
        let data = instruction.pack().unwrap();
        assert_eq!(data[0], 3);
        assert_eq!(VaultInstruction::unpack(&data).unwrap(), instruction);
    }

    #[test]
    fn test_unpack_rejects_bad_input() {
        assert_eq!(
            VaultInstruction::unpack(&[]).unwrap_err(),
            ProgramError::InvalidInstructionData
        );
        assert_eq!(
            VaultInstruction::unpack(&[9]).unwrap_err(),
            ProgramError::InvalidInstructionData
        );
        // Truncated payload
        assert_eq!(
            VaultInstruction::unpack(&[2, 1, 0]).unwrap_err(),
            ProgramError::InvalidInstructionData
        );
    }

    #[test]
    fn test_builders_set_account_roles() {
        let program_id = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let vault = Pubkey::new_unique();

        let ix = set_performance_fee(&program_id, &authority, &vault, 1_000).unwrap();
        assert!(ix.accounts[0].is_signer);
        assert!(!ix.accounts[0].is_writable);
        assert!(ix.accounts[1].is_writable);
        assert_eq!(
            VaultInstruction::unpack(&ix.data).unwrap(),
            VaultInstruction::SetPerformanceFee { performance_fee_bps: 1_000 }
        );
    }
}
