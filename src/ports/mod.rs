//! Ports Layer - Trait definitions for external collaborators
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Indicator feeds (trend strength, volatility, oscillators, bars)
//! - Order execution (market/pending placement, closes)
//! - Risk sizing, trend confirmation, pattern detection, key levels
//! - Decision persistence

pub mod execution;
pub mod indicator_feed;
pub mod mocks;
pub mod recorder;
pub mod strategy;

pub use execution::{ExecutionGateway, Fill, GatewayError};
pub use indicator_feed::{FeedError, FeedResult, IndicatorFeed, OscillatorKind};
pub use recorder::{DecisionRecorder, RecorderError};
pub use strategy::{KeyLevelProvider, PatternDetector, RiskModel, TrendConfirmation};
