pub mod amount;
pub mod bridge;
pub mod config;
pub mod error;
pub mod fee;
pub mod provider;
pub mod reduce;
pub mod selection;
pub mod spend;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use amount::SatoshiAmount;
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::CoreError;
pub use provider::{BitcoindHandler, ProviderHandler, ProviderOutcome, RpcAuth};
