pub mod checkpoints;
pub mod config;
pub mod export;
