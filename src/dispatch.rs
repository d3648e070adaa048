//! Batch dispatch: item identifiers, fixed-size batch planning, and the
//! sequential fan-out/fan-in loop.

pub mod batch;
pub mod dispatcher;
pub mod item;
