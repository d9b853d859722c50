// Core modules for the respack log compactor
pub mod buffer; // capped growable output buffer
pub mod engine; // command classification + dual-table aggregation
pub mod error; // crate error taxonomy
pub mod protocol; // incremental RESP decoder + command encoder
pub mod table; // two-level key/member hash table

// Re-export all public items from modules for easier access
pub use buffer::*;
pub use engine::*;
pub use error::*;
pub use protocol::*;
pub use table::*;

// How much input to hand the decoder at a time. Kept small so that
// compacting the retained tail when a command straddles chunks stays cheap.
pub const CHUNK_SIZE: usize = 1024;
