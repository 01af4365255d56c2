//! Single-item request runner: claims one queued request, runs its command
//! and reports the outcome to the queue row and the request's ticket.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod testing;
pub mod tracker;

pub use error::RunbotError;
