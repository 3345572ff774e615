pub mod context;
pub mod engine;
pub mod positions;

pub use context::{InstrumentContext, RegimeChange};
pub use engine::{CycleOutcome, DecisionEngine, EngineConfig, EngineHandle, EngineParts};
pub use positions::{
    ExitConfig, ExitPlan, ExitReason, PositionActivity, PositionManager, SideExit, StopUpdate,
};
