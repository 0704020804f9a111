//! distfs - a small distributed text file service: one coordinator
//! tracking placement, leases, and access requests; many storage
//! nodes holding sentence/word-indexed text files (spec.md S1-S2).

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod parser;
pub mod protocol;
pub mod storage;
