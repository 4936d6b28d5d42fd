pub mod entity;
pub mod model;
pub mod service;
#[cfg(test)]
mod tests;
