//! Semantic memory HTTP server.
//! Run with: cargo run --bin semantic-memory-server [config.json]

use std::process::ExitCode;

use semantic_memory::start_semantic_memory;

fn main() -> ExitCode {
    start_semantic_memory::run()
}
