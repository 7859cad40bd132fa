pub mod memoizing;
pub mod speculative;
pub mod web;

pub use memoizing::{AllItems, MemoizingCache};
pub use speculative::SpeculativeCache;
pub use web::WebCache;
