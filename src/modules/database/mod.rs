use crate::modules::account::entity::Account;
use crate::modules::email::entity::EmailRecord;
use crate::modules::error::{MailFusionError, MailFusionResult};
use crate::modules::hook::entity::Webhook;
use crate::modules::hook::log::WebhookLog;
use crate::modules::rule::entity::EmailRule;
use crate::modules::sync::log::SyncLog;
use crate::raise_error;
use db_type::{KeyOptions, ToKeyDefinition};
use itertools::Itertools;
use native_db::*;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use transaction::RwTransaction;

use super::error::code::ErrorCode;
pub mod manager;

static MODELS: OnceLock<Models> = OnceLock::new();

/// Model registry shared by every database opened in this process.
pub fn models() -> MailFusionResult<&'static Models> {
    if let Some(models) = MODELS.get() {
        return Ok(models);
    }
    let mut adapter = ModelsAdapter::new();
    adapter.register_metadata_models()?;
    Ok(MODELS.get_or_init(|| adapter.models))
}

pub struct ModelsAdapter {
    pub models: Models,
}

impl ModelsAdapter {
    pub fn new() -> Self {
        ModelsAdapter {
            models: Models::new(),
        }
    }

    pub fn register_model<T: ToInput>(&mut self) -> MailFusionResult<()> {
        self.models.define::<T>().map_err(|e| {
            raise_error!(
                format!("failed to define model: {:#?}", e),
                ErrorCode::InternalError
            )
        })
    }

    pub fn register_metadata_models(&mut self) -> MailFusionResult<()> {
        self.register_model::<Account>()?;
        self.register_model::<EmailRecord>()?;
        self.register_model::<EmailRule>()?;
        self.register_model::<Webhook>()?;
        self.register_model::<WebhookLog>()?;
        self.register_model::<SyncLog>()?;
        Ok(())
    }
}

#[inline]
pub(crate) fn db_error<E: std::fmt::Debug>(error: E) -> MailFusionError {
    raise_error!(format!("{:#?}", error), ErrorCode::InternalError)
}

/// Runs `task` on the blocking pool; redb transactions must not run on async workers.
pub async fn blocking<R, F>(database: &Arc<Database<'static>>, task: F) -> MailFusionResult<R>
where
    R: Send + 'static,
    F: FnOnce(&Database<'static>) -> MailFusionResult<R> + Send + 'static,
{
    let db = database.clone();
    tokio::task::spawn_blocking(move || task(&db))
        .await
        .map_err(db_error)?
}

/// Runs `task` inside one read-write transaction and commits it when `task` succeeds.
///
/// redb serializes writers, so a read-modify-write done here is atomic.
pub async fn write_txn<R, F>(database: &Arc<Database<'static>>, task: F) -> MailFusionResult<R>
where
    R: Send + 'static,
    F: FnOnce(&RwTransaction) -> MailFusionResult<R> + Send + 'static,
{
    blocking(database, move |db| {
        let rw = db.rw_transaction().map_err(db_error)?;
        let result = task(&rw)?;
        rw.commit().map_err(db_error)?;
        Ok(result)
    })
    .await
}

pub async fn insert_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    item: T,
) -> MailFusionResult<()> {
    write_txn(database, move |rw| rw.insert(item).map_err(db_error)).await
}

pub async fn upsert_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    item: T,
) -> MailFusionResult<()> {
    write_txn(database, move |rw| {
        rw.upsert(item).map_err(db_error)?;
        Ok(())
    })
    .await
}

/// Loads the current row with `current`, derives its replacement with `updated`
/// and swaps them in the same transaction. Returns the replacement.
pub async fn update_impl<T: ToInput + Clone + std::fmt::Debug + Send + 'static>(
    database: &Arc<Database<'static>>,
    current: impl FnOnce(&RwTransaction) -> MailFusionResult<T> + Send + 'static,
    updated: impl FnOnce(&T) -> MailFusionResult<T> + Send + 'static,
) -> MailFusionResult<T> {
    write_txn(database, move |rw| {
        let current_item = current(rw)?;
        let updated_item = updated(&current_item)?;
        rw.update(current_item, updated_item.clone())
            .map_err(db_error)?;
        Ok(updated_item)
    })
    .await
}

pub async fn async_find_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    key: impl ToKey + Send + 'static,
) -> MailFusionResult<Option<T>> {
    blocking(database, move |db| {
        let r_transaction = db.r_transaction().map_err(db_error)?;
        r_transaction.get().primary(key).map_err(db_error)
    })
    .await
}

pub async fn delete_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    delete: impl FnOnce(&RwTransaction) -> MailFusionResult<T> + Send + 'static,
) -> MailFusionResult<()> {
    write_txn(database, move |rw| {
        let to_delete = delete(rw)?;
        rw.remove::<T>(to_delete).map_err(db_error)?;
        Ok(())
    })
    .await
}

pub async fn batch_delete_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    delete: impl FnOnce(&RwTransaction) -> MailFusionResult<Vec<T>> + Send + 'static,
) -> MailFusionResult<usize> {
    write_txn(database, move |rw| {
        let to_delete = delete(rw)?;
        let delete_count = to_delete.len();
        for item in to_delete {
            rw.remove(item).map_err(db_error)?;
        }
        Ok(delete_count)
    })
    .await
}

pub async fn list_all_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
) -> MailFusionResult<Vec<T>> {
    blocking(database, move |db| {
        let r_transaction = db.r_transaction().map_err(db_error)?;
        let entities: Vec<T> = r_transaction
            .scan()
            .primary()
            .map_err(db_error)?
            .all()
            .map_err(db_error)?
            .try_collect()
            .map_err(db_error)?;
        Ok(entities)
    })
    .await
}

/// Rows whose secondary key starts with `start_with`.
pub async fn filter_by_secondary_key_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    key_def: impl ToKeyDefinition<KeyOptions> + Send + 'static,
    start_with: impl ToKey + Send + 'static,
) -> MailFusionResult<Vec<T>> {
    blocking(database, move |db| {
        let r_transaction = db.r_transaction().map_err(db_error)?;
        let entities: Vec<T> = r_transaction
            .scan()
            .secondary(key_def)
            .map_err(db_error)?
            .start_with(start_with)
            .map_err(db_error)?
            .try_collect()
            .map_err(db_error)?;
        Ok(entities)
    })
    .await
}

pub async fn secondary_find_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    key_def: impl ToKeyDefinition<KeyOptions> + Send + 'static,
    key: impl ToKey + Send + 'static,
) -> MailFusionResult<Option<T>> {
    blocking(database, move |db| {
        let r_transaction = db.r_transaction().map_err(db_error)?;
        r_transaction.get().secondary(key_def, key).map_err(db_error)
    })
    .await
}

// Secondary keys used for listing embed the creation time right after the owner prefix,
// so a prefix scan returns rows in time order and `desc` just reverses the iterator.
pub async fn paginate_secondary_scan_impl<
    T: ToInput + Serialize + std::fmt::Debug + std::marker::Unpin + Send + Sync + 'static,
>(
    database: &Arc<Database<'static>>,
    page: Option<u64>,
    page_size: Option<u64>,
    desc: Option<bool>,
    key_def: impl ToKeyDefinition<KeyOptions> + Send + 'static,
    start_with: impl ToKey + Send + Clone + 'static,
) -> MailFusionResult<Paginated<T>> {
    blocking(database, move |db| {
        let r_transaction = db.r_transaction().map_err(db_error)?;
        let scan = r_transaction.scan().secondary::<T>(key_def).map_err(db_error)?;
        let total_items = scan
            .start_with(start_with.clone())
            .map_err(db_error)?
            .count() as u64;

        let (offset, total_pages) = match (page, page_size) {
            (Some(p), Some(s)) => {
                if p == 0 || s == 0 {
                    return Err(raise_error!(
                        "'page' and 'page_size' must be greater than 0.".to_string(),
                        ErrorCode::InvalidParameter
                    ));
                }
                (Some((p - 1) * s), Some(total_items.div_ceil(s)))
            }
            _ => (None, None),
        };

        if matches!(offset, Some(offset) if offset >= total_items) {
            return Ok(Paginated::new(
                page,
                page_size,
                total_items,
                total_pages,
                vec![],
            ));
        }

        let iter = scan.start_with(start_with).map_err(db_error)?;
        let skip = offset.unwrap_or(0) as usize;
        let take = page_size.unwrap_or(total_items) as usize;
        let items: Vec<T> = match desc {
            Some(true) => iter
                .rev()
                .skip(skip)
                .take(take)
                .try_collect()
                .map_err(db_error)?,
            _ => iter.skip(skip).take(take).try_collect().map_err(db_error)?,
        };

        Ok(Paginated::new(
            page,
            page_size,
            total_items,
            total_pages,
            items,
        ))
    })
    .await
}

/// Pages an already filtered and ordered list with the same rules as the scans above.
pub fn paginate_vec<T>(
    items: Vec<T>,
    page: Option<u64>,
    page_size: Option<u64>,
) -> MailFusionResult<Paginated<T>> {
    let total_items = items.len() as u64;
    match (page, page_size) {
        (Some(p), Some(s)) => {
            if p == 0 || s == 0 {
                return Err(raise_error!(
                    "'page' and 'page_size' must be greater than 0.".to_string(),
                    ErrorCode::InvalidParameter
                ));
            }
            let offset = ((p - 1) * s).min(total_items) as usize;
            let items = items.into_iter().skip(offset).take(s as usize).collect();
            Ok(Paginated::new(
                page,
                page_size,
                total_items,
                Some(total_items.div_ceil(s)),
                items,
            ))
        }
        _ => Ok(Paginated::new(page, page_size, total_items, None, items)),
    }
}

#[derive(Debug)]
pub struct Paginated<T> {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub total_items: u64,
    pub total_pages: Option<u64>,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(
        page: Option<u64>,
        page_size: Option<u64>,
        total_items: u64,
        total_pages: Option<u64>,
        items: Vec<T>,
    ) -> Self {
        Paginated {
            page,
            page_size,
            total_items,
            total_pages,
            items,
        }
    }
}

/// Sort key component for a millisecond timestamp; negative values clamp to zero.
pub fn time_key(millis: i64) -> String {
    format!("{:020}", millis.max(0))
}
