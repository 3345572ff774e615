//! Regime Trader - Regime-Gated Trading Decision Engine Library
//!
//! Classifies each instrument's market regime from trend-strength and
//! volatility readings on three timeframes, then lets a trade through only
//! when the chain of checks for that regime passes. Every cycle ends in one
//! recorded decision.
//!
//! # Modules
//!
//! - `domain`: Value types (Timeframe, RegimeSnapshot, KeyLevel, OrderSpec, TradeDecision)
//! - `ports`: Collaborator traits (IndicatorFeed, ExecutionGateway, RiskModel, DecisionRecorder)
//! - `strategy`: RegimeClassifier and SignalGate with trend/breakout/range chains
//! - `execution`: OrderBuilder, broker normalization, FIFO-safe closing, retries
//! - `application`: Per-instrument context and the periodic DecisionEngine
//! - `adapters`: Replay feed, paper gateway, risk model, recorder, CLI
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod execution;
pub mod ports;
pub mod strategy;
