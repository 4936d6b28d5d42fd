pub mod engine;
pub mod lock;
pub mod log;
pub mod manager;
