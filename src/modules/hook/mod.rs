pub mod delivery;
pub mod entity;
pub mod log;
pub mod payload;
pub mod service;
