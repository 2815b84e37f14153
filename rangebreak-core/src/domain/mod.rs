//! Domain types for RangeBreak

pub mod bar;
pub mod ids;
pub mod range;
pub mod signal;
pub mod spec;
pub mod trade;

pub use bar::PriceBar;
pub use ids::{RunId, StrategyId, WindowId};
pub use range::OpeningRange;
pub use signal::{BreakoutSignal, Direction, DirectionFilter};
pub use spec::{RawStrategySpec, SizeFilter, SpecError, StopMode, StrategySpec};
pub use trade::{NoTradeReason, Outcome, SimulatedTrade};
