// Leveraged Yield Vault
// Native Solana implementation - NO ANCHOR
//
// The strategy core (share math, valuation, leverage loop, unwind) is plain Rust over the
// collaborator traits in `venue`; the program entrypoint only manages the persisted
// vault account and its parameters.

use solana_program::entrypoint;

pub mod engine;
pub mod error;
pub mod instructions;
pub mod math;
pub mod processor;
pub mod simulation;
pub mod state;
pub mod vault;
pub mod venue;

use processor::process_instruction;

pub use error::VaultError;
pub use vault::LeveragedVault;

// Declare program ID
solana_program::declare_id!("LevVau1t11111111111111111111111111111111111");

#[cfg(not(feature = "no-entrypoint"))]
entrypoint!(process_instruction);
