// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::models;
use crate::modules::error::{code::ErrorCode, MailFusionError, MailFusionResult};
use crate::raise_error;
use native_db::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Where the metadata database lives.
#[derive(Debug, Clone)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

pub struct DatabaseManager;

impl DatabaseManager {
    pub fn open(location: DatabaseLocation) -> MailFusionResult<Arc<Database<'static>>> {
        let models = models()?;
        match location {
            DatabaseLocation::Memory => {
                info!("Opening in-memory metadata database");
                let database = Builder::new()
                    .create_in_memory(models)
                    .map_err(Self::handle_database_error)?;
                Ok(Arc::new(database))
            }
            DatabaseLocation::File(path) => {
                info!("Opening metadata database at {:?}", path);
                let mut database = Builder::new()
                    .create(models, path)
                    .map_err(Self::handle_database_error)?;
                database
                    .compact()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
                Ok(Arc::new(database))
            }
        }
    }

    pub fn in_memory() -> MailFusionResult<Arc<Database<'static>>> {
        Self::open(DatabaseLocation::Memory)
    }

    fn handle_database_error(error: native_db::db_type::Error) -> MailFusionError {
        match error {
            native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
                redb::DatabaseError::DatabaseAlreadyOpen => {
                    raise_error!(
                        "Database is already open by another instance".into(),
                        ErrorCode::InternalError
                    )
                }
                other => {
                    raise_error!(
                        format!("Database error: {:?}", other),
                        ErrorCode::InternalError
                    )
                }
            },
            other => {
                raise_error!(
                    format!("Failed to create database: {:?}", other),
                    ErrorCode::InternalError
                )
            }
        }
    }
}
