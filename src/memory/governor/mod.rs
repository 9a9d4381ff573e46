//! Self-protection for bursty callers: debouncing, rate limiting and a search cache.

pub mod cache;
pub mod debounce;
pub mod execution;
pub mod outcome;
pub mod rate_limit;

pub use cache::{SearchCache, SearchKey};
pub use debounce::Debouncer;
pub use execution::{ExecutionGovernor, GovernorStats};
pub use outcome::{Outcome, SkipReason};
pub use rate_limit::RateLimiter;
