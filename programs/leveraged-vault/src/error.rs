use num_derive::FromPrimitive;
use solana_program::{
    decode_error::DecodeError,
    program_error::{PrintProgramError, ProgramError},
};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, FromPrimitive, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid instruction")]
    InvalidInstruction = 0,

    #[error("Account not initialized")]
    AccountNotInitialized = 1,

    #[error("Account already initialized")]
    AccountAlreadyInitialized = 2,

    #[error("Invalid authority")]
    InvalidAuthority = 3,

    #[error("Amount must be greater than zero")]
    ZeroAmount = 4,

    #[error("Operation would mint or burn zero shares")]
    ZeroShares = 5,

    #[error("Insufficient shares")]
    InsufficientShares = 6,

    #[error("Target LTV must be below max LTV")]
    InvalidTargetLtv = 7,

    #[error("Loop count out of range")]
    InvalidLoopCount = 8,

    #[error("Slippage tolerance out of range")]
    InvalidSlippageTolerance = 9,

    #[error("Health factor floor out of range")]
    InvalidHealthFactorFloor = 10,

    #[error("Unwind parameters out of range")]
    InvalidUnwindParameters = 11,

    #[error("Performance fee out of range")]
    InvalidFeeParameters = 12,

    #[error("Health factor below floor")]
    HealthFactorBelowFloor = 13,

    #[error("Invalid oracle price")]
    InvalidOraclePrice = 14,

    #[error("Slippage exceeded")]
    SlippageExceeded = 15,

    #[error("Quote unavailable")]
    QuoteUnavailable = 16,

    #[error("Insufficient liquidity to release requested assets")]
    InsufficientLiquidity = 17,

    #[error("Unwind could not free any collateral")]
    UnwindFailed = 18,

    #[error("Insufficient token balance")]
    InsufficientBalance = 19,

    #[error("Insufficient token allowance")]
    InsufficientAllowance = 20,

    #[error("Lending venue rejected the operation")]
    VenueRejected = 21,

    #[error("Unsupported asset")]
    UnsupportedAsset = 22,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow = 23,

    #[error("Division by zero")]
    DivisionByZero = 24,
}

impl PrintProgramError for VaultError {
    fn print<E>(&self) {
        use solana_program::msg;
        msg!("VaultError: {}", self);
    }
}

impl From<VaultError> for ProgramError {
    fn from(e: VaultError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for VaultError {
    fn type_of() -> &'static str {
        "VaultError"
    }
}
