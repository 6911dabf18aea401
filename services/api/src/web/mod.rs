pub mod consistency_task;
pub mod dto;
pub mod protocol;
pub mod rest;
pub mod router;
pub mod state;
pub mod ws_handler;

// Re-export the pieces the server binary wires together.
pub use consistency_task::spawn_consistency_task;
pub use router::build_router;
pub use ws_handler::ws_handler;
