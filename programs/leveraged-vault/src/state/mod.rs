pub mod position;
pub mod strategy_config;
pub mod vault_state;

pub use position::*;
pub use strategy_config::*;
pub use vault_state::*;
