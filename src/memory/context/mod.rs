//! Token-budgeted context assembly.

pub mod budget;
pub mod builder;

pub use budget::{BYTES_PER_TOKEN, ContextBudget, estimate_tokens, truncate_to_bytes};
pub use builder::{AssembledContext, assemble, render_memory_entry};
