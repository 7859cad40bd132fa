pub mod countdown;
pub mod shared_value;

pub use countdown::ActionCountdown;
pub(crate) use shared_value::run_guarded;
pub use shared_value::{Outcome, Promise, SharedValue, promise};
