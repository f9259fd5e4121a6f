pub mod config;
pub mod coordinator;
pub mod effects;
pub mod logging;
pub mod persistence;
pub mod signals;
