//! Strategy Layer - Regime classification and regime-gated signal evaluation
//!
//! - `RegimeClassifier`: fuses three timeframes into one of five regimes
//! - `SignalGate`: trend / breakout / range evaluation chains with
//!   structured rejection reasons

pub mod gate;
pub mod params;
pub mod regime;

pub use gate::{AcceptedSignal, Evaluation, GateInputs, GateVerdict, RejectReason, SignalGate};
pub use params::{
    BreakoutChainConfig, GateConfig, ParamError, RangeChainConfig, RegimeConfig, TimeframeTable,
    TrendChainConfig,
};
pub use regime::{FeedState, RegimeClassifier};
