//! Market and contract data: core types, option-chain ingestion, and
//! closing-price history.

pub mod chains;
pub mod history;
pub mod types;

pub use chains::{ChainError, ChainLoader, EXPECTED_COLUMNS};
pub use history::{HistoryError, InMemoryHistory, PriceHistory, YahooClient};
pub use types::{OptionChain, OptionContract, OptionType, PriceBar};
