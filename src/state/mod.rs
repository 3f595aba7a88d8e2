//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `WorkUnit`: one page-fetch task (URL + depth) and its identity key
//! - `UnitState`: the lifecycle a unit goes through inside one run

mod unit_state;
mod work_unit;

pub use unit_state::UnitState;
pub use work_unit::WorkUnit;
