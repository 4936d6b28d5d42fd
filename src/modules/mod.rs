// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod account;
pub mod adapter;
pub mod common;
pub mod context;
pub mod database;
pub mod email;
pub mod error;
pub mod events;
pub mod hook;
pub mod logger;
pub mod overview;
pub mod rest;
pub mod rule;
pub mod settings;
pub mod sync;
pub mod utils;
