//! Execution layer: cost model, outcome classifier, and trade simulator.

pub mod classifier;
pub mod cost_model;
pub mod simulator;

pub use classifier::{classify, Classification};
pub use cost_model::{CostError, CostModel, CostTable, Friction, RealizedLegs};
pub use simulator::{simulate_from_bar, simulate_trade, stop_price};
