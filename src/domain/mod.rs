//! Domain Layer - Core value types for the decision engine
//!
//! This module contains pure domain types and logic with no external dependencies.
//! All external interactions happen through the ports layer.

pub mod decision;
pub mod key_level;
pub mod market;
pub mod order;
pub mod position;
pub mod regime;
pub mod retry;
pub mod timeframe;

pub use decision::{
    DecisionDraft, DecisionOutcome, IndicatorReadings, MarketFields, OrderFields, SignalType,
    TradeDecision,
};
pub use key_level::KeyLevel;
pub use market::{AccountState, Candle, Quote, Side, SymbolSpec};
pub use order::{OrderKind, OrderSpec};
pub use position::{OpenPosition, PendingOrder};
pub use regime::{MarketRegime, RegimeSnapshot};
pub use retry::RetryPolicy;
pub use timeframe::Timeframe;
