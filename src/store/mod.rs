//! The State Store (§4.1): durable record of jobs and files with their
//! lifecycle state. Every mutation goes through one of these free functions;
//! the engine performs no multi-statement transactions across Store calls.

pub mod file;
pub mod job;

pub use file::{File, FileState, NewFileStat};
pub use job::{JobState, UploadJob};
