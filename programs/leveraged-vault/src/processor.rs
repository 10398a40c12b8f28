use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::invoke,
    program_error::ProgramError,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

use crate::{
    error::VaultError,
    instructions::VaultInstruction,
    state::{AssetPair, StrategyConfig, VaultState},
};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    let instruction = VaultInstruction::unpack(instruction_data)?;

    match instruction {
        VaultInstruction::InitializeVault {
            base_mint,
            base_decimals,
            borrow_mint,
            borrow_decimals,
            fee_recipient,
        } => {
            msg!("Instruction: InitializeVault");
            process_initialize_vault(
                program_id,
                accounts,
                AssetPair {
                    base_mint,
                    base_decimals,
                    borrow_mint,
                    borrow_decimals,
                },
                fee_recipient,
            )
        }

        VaultInstruction::SetStrategyParameters {
            target_ltv_bps,
            loop_count,
            slippage_tolerance_bps,
        } => {
            msg!("Instruction: SetStrategyParameters");
            process_update_config(program_id, accounts, |config| {
                config.set_parameters(target_ltv_bps, loop_count, slippage_tolerance_bps)
            })
        }

        VaultInstruction::SetRiskParameters {
            max_ltv_bps,
            min_health_factor,
        } => {
            msg!("Instruction: SetRiskParameters");
            process_update_config(program_id, accounts, |config| {
                config.set_risk_parameters(max_ltv_bps, min_health_factor)
            })
        }

        VaultInstruction::SetUnwindParameters {
            full_unwind_threshold_bps,
            unwind_buffer_bps,
            dust_threshold_value,
            max_unwind_iterations,
            swap_fallback_premium_bps,
        } => {
            msg!("Instruction: SetUnwindParameters");
            process_update_config(program_id, accounts, |config| {
                config.set_unwind_parameters(
                    full_unwind_threshold_bps,
                    unwind_buffer_bps,
                    dust_threshold_value,
                    max_unwind_iterations,
                    swap_fallback_premium_bps,
                )
            })
        }

        VaultInstruction::SetPerformanceFee { performance_fee_bps } => {
            msg!("Instruction: SetPerformanceFee");
            process_update_config(program_id, accounts, |config| {
                config.set_performance_fee(performance_fee_bps)
            })
        }
    }
}

/// Create and initialize the vault account
fn process_initialize_vault(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    assets: AssetPair,
    fee_recipient: Pubkey,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let authority_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;
    let system_program = next_account_info(account_info_iter)?;
    let rent_sysvar = next_account_info(account_info_iter)?;

    // Verify authority is signer
    if !authority_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    if VaultState::is_initialized_data(&vault_info.data.borrow()) {
        return Err(VaultError::AccountAlreadyInitialized.into());
    }

    // Validate before paying for the account
    let mut vault = VaultState::new(*authority_info.key, assets, fee_recipient);
    vault.validate()?;

    let rent = &Rent::from_account_info(rent_sysvar)?;
    let required_lamports = rent.minimum_balance(VaultState::LEN);

    invoke(
        &system_instruction::create_account(
            authority_info.key,
            vault_info.key,
            required_lamports,
            VaultState::LEN as u64,
            program_id,
        ),
        &[
            authority_info.clone(),
            vault_info.clone(),
            system_program.clone(),
        ],
    )?;

    vault.last_update = Clock::get()?.unix_timestamp;
    vault.pack(&mut vault_info.data.borrow_mut())?;

    msg!(
        "Vault initialized: base {} ({} decimals), borrow {} ({} decimals)",
        assets.base_mint,
        assets.base_decimals,
        assets.borrow_mint,
        assets.borrow_decimals
    );

    Ok(())
}

/// Apply a validated config update on behalf of the stored authority
fn process_update_config<F>(program_id: &Pubkey, accounts: &[AccountInfo], update: F) -> ProgramResult
where
    F: FnOnce(&mut StrategyConfig) -> Result<(), ProgramError>,
{
    let account_info_iter = &mut accounts.iter();

    let authority_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;

    if !authority_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    if vault_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }

    let mut vault = VaultState::unpack(&vault_info.data.borrow())?;

    if vault.authority != *authority_info.key {
        return Err(VaultError::InvalidAuthority.into());
    }

    update(&mut vault.config)?;
    vault.last_update = Clock::get()?.unix_timestamp;
    vault.pack(&mut vault_info.data.borrow_mut())?;

    Ok(())
}
