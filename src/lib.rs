//! Bracket builder and draw engine: knockout, round-elimination and group stages,
//! constraint-aware slot assignment, and result propagation.

pub mod config;
pub mod logic;
pub mod models;
pub mod repository;

pub use config::ServerConfig;
pub use logic::*;
pub use models::*;
pub use repository::{BracketRepository, MemoryRepository, PairFill, SlotFill, WriteBatch};
