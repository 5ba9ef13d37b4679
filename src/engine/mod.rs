pub mod dispatch;
pub mod queue;
pub mod sync;
pub mod trips;
