use solana_program_test::*;
use solana_sdk::{
    instruction::InstructionError,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::{Transaction, TransactionError},
};
use leveraged_vault::{
    instructions::{
        initialize_vault, set_performance_fee, set_risk_parameters, set_strategy_parameters,
        set_unwind_parameters,
    },
    state::{StrategyConfig, VaultState},
    VaultError,
};

fn program_test() -> ProgramTest {
    ProgramTest::new(
        "leveraged_vault",
        leveraged_vault::id(),
        processor!(leveraged_vault::processor::process_instruction),
    )
}

async fn create_vault(
    banks_client: &mut BanksClient,
    payer: &Keypair,
    recent_blockhash: solana_sdk::hash::Hash,
) -> Keypair {
    let vault = Keypair::new();
    let ix = initialize_vault(
        &leveraged_vault::id(),
        &payer.pubkey(),
        &vault.pubkey(),
        &Pubkey::new_unique(),
        6,
        &Pubkey::new_unique(),
        6,
        &Pubkey::new_unique(),
    )
    .unwrap();

    let mut transaction = Transaction::new_with_payer(&[ix], Some(&payer.pubkey()));
    transaction.sign(&[payer, &vault], recent_blockhash);
    banks_client.process_transaction(transaction).await.unwrap();
    vault
}

async fn load_vault(banks_client: &mut BanksClient, vault: &Pubkey) -> VaultState {
    let account = banks_client.get_account(*vault).await.unwrap().unwrap();
    assert_eq!(account.owner, leveraged_vault::id());
    assert_eq!(account.data.len(), VaultState::LEN);
    VaultState::unpack(&account.data).unwrap()
}

fn custom_error(err: BanksClientError) -> Option<u32> {
    match err.unwrap() {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => Some(code),
        _ => None,
    }
}

#[tokio::test]
async fn test_initialize_vault() {
    let (mut banks_client, payer, recent_blockhash) = program_test().start().await;

    let vault = create_vault(&mut banks_client, &payer, recent_blockhash).await;
    let state = load_vault(&mut banks_client, &vault.pubkey()).await;

    assert!(state.is_initialized);
    assert_eq!(state.authority, payer.pubkey());
    assert_eq!(state.config, StrategyConfig::default());
    assert_eq!(state.total_shares, 0);
    assert_eq!(state.assets.base_decimals, 6);
}

#[tokio::test]
async fn test_initialize_rejects_identical_assets() {
    let (mut banks_client, payer, recent_blockhash) = program_test().start().await;

    let vault = Keypair::new();
    let mint = Pubkey::new_unique();
    let ix = initialize_vault(
        &leveraged_vault::id(),
        &payer.pubkey(),
        &vault.pubkey(),
        &mint,
        6,
        &mint,
        6,
        &Pubkey::new_unique(),
    )
    .unwrap();

    let mut transaction = Transaction::new_with_payer(&[ix], Some(&payer.pubkey()));
    transaction.sign(&[&payer, &vault], recent_blockhash);
    let err = banks_client.process_transaction(transaction).await.unwrap_err();
    assert_eq!(custom_error(err), Some(VaultError::UnsupportedAsset as u32));
}

#[tokio::test]
async fn test_set_parameters() {
    let (mut banks_client, payer, recent_blockhash) = program_test().start().await;
    let vault = create_vault(&mut banks_client, &payer, recent_blockhash).await;
    let program_id = leveraged_vault::id();

    let instructions = [
        set_strategy_parameters(&program_id, &payer.pubkey(), &vault.pubkey(), 6_500, 5, 50)
            .unwrap(),
        set_risk_parameters(&program_id, &payer.pubkey(), &vault.pubkey(), 8_000, 1_100_000)
            .unwrap(),
        set_unwind_parameters(
            &program_id,
            &payer.pubkey(),
            &vault.pubkey(),
            9_000,
            12_000,
            50_000_000,
            16,
            800,
        )
        .unwrap(),
        set_performance_fee(&program_id, &payer.pubkey(), &vault.pubkey(), 1_000).unwrap(),
    ];

    let mut transaction = Transaction::new_with_payer(&instructions, Some(&payer.pubkey()));
    transaction.sign(&[&payer], recent_blockhash);
    banks_client.process_transaction(transaction).await.unwrap();

    let config = load_vault(&mut banks_client, &vault.pubkey()).await.config;
    assert_eq!(config.target_ltv_bps, 6_500);
    assert_eq!(config.loop_count, 5);
    assert_eq!(config.slippage_tolerance_bps, 50);
    assert_eq!(config.max_ltv_bps, 8_000);
    assert_eq!(config.min_health_factor, 1_100_000);
    assert_eq!(config.full_unwind_threshold_bps, 9_000);
    assert_eq!(config.unwind_buffer_bps, 12_000);
    assert_eq!(config.dust_threshold_value, 50_000_000);
    assert_eq!(config.max_unwind_iterations, 16);
    assert_eq!(config.swap_fallback_premium_bps, 800);
    assert_eq!(config.performance_fee_bps, 1_000);
}

#[tokio::test]
async fn test_invalid_parameters_leave_config_unchanged() {
    let (mut banks_client, payer, recent_blockhash) = program_test().start().await;
    let vault = create_vault(&mut banks_client, &payer, recent_blockhash).await;

    // Target above the 75% ceiling
    let ix = set_strategy_parameters(
        &leveraged_vault::id(),
        &payer.pubkey(),
        &vault.pubkey(),
        8_000,
        5,
        50,
    )
    .unwrap();
    let mut transaction = Transaction::new_with_payer(&[ix], Some(&payer.pubkey()));
    transaction.sign(&[&payer], recent_blockhash);
    let err = banks_client.process_transaction(transaction).await.unwrap_err();
    assert_eq!(custom_error(err), Some(VaultError::InvalidTargetLtv as u32));

    let config = load_vault(&mut banks_client, &vault.pubkey()).await.config;
    assert_eq!(config, StrategyConfig::default());
}

#[tokio::test]
async fn test_unauthorized_update_rejected() {
    let (mut banks_client, payer, recent_blockhash) = program_test().start().await;
    let vault = create_vault(&mut banks_client, &payer, recent_blockhash).await;

    let intruder = Keypair::new();
    let ix = set_performance_fee(
        &leveraged_vault::id(),
        &intruder.pubkey(),
        &vault.pubkey(),
        3_000,
    )
    .unwrap();
    let mut transaction = Transaction::new_with_payer(&[ix], Some(&payer.pubkey()));
    transaction.sign(&[&payer, &intruder], recent_blockhash);
    let err = banks_client.process_transaction(transaction).await.unwrap_err();
    assert_eq!(custom_error(err), Some(VaultError::InvalidAuthority as u32));

    let config = load_vault(&mut banks_client, &vault.pubkey()).await.config;
    assert_eq!(config.performance_fee_bps, 0);
}
