pub mod engine;
pub mod entity;
pub mod payload;
pub mod service;
#[cfg(test)]
mod tests;
