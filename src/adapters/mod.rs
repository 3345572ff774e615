//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Replay: indicator feed over historical bars, swing-point key levels
//! - Paper: simulated execution gateway with stop/target marking
//! - Risk: fixed-fractional sizing with ATR stops
//! - Recorder: JSON-lines decision log
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod paper;
pub mod recorder;
pub mod replay;
pub mod risk;

pub use cli::CliApp;
pub use paper::{PaperExit, PaperGateway};
pub use recorder::JsonlRecorder;
pub use replay::{ReplayFeed, ReplaySettings, SwingLevels};
pub use risk::{FixedFractionalRisk, RiskConfig};
