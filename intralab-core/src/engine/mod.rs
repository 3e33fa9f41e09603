//! Strategy execution: state machine, simulated broker and the bar loop.

pub mod broker;
pub mod event_loop;
pub mod state;

pub use broker::{FillTiming, SimulatedBroker};
pub use event_loop::{run_strategy, RunConfig, RunResult};
pub use state::{EngineError, StrategyMachine, StrategyParams, StrategyState};
