//! Memory engine orchestration module.

pub mod core;
pub mod requests;

pub use core::{EngineStats, MemoryBackends, MemoryEngine};
pub use requests::{
    ContextRequest, HookEvent, HookOutcome, MemoryRequest, MemoryResponse, SearchRequest,
};
