// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::modules::account::entity::Account;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::sync::engine::SyncEngine;
use crate::modules::sync::lock::SyncLocks;
use crate::modules::sync::log::{SyncLog, SyncType};
use crate::modules::utils::shutdown::stop_requested;
use crate::{raise_error, utc_now};

#[derive(Clone, Debug)]
pub struct SyncManagerConfig {
    pub tick_interval: Duration,
    /// Upper bound of account syncs running at once from a fan-out.
    pub concurrency: usize,
    /// How long `stop` waits for running syncs before aborting them.
    pub drain_timeout: Duration,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(300),
            concurrency: 8,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Periodic and on-demand account syncs.
///
/// Fan-out tasks live in a `JoinSet` owned by the manager; a `watch` flag cancels them
/// at their I/O boundaries when the manager stops.
pub struct SyncManager {
    engine: Arc<SyncEngine>,
    locks: SyncLocks,
    config: SyncManagerConfig,
    permits: Arc<Semaphore>,
    cancel: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl SyncManager {
    pub fn new(engine: Arc<SyncEngine>, config: SyncManagerConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            engine,
            locks: SyncLocks::default(),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
            cancel,
            ticker: Mutex::new(None),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn locks(&self) -> &SyncLocks {
        &self.locks
    }

    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    /// Launches the ticker and returns immediately.
    pub async fn start(self: &Arc<Self>) -> MailFusionResult<()> {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            return Err(raise_error!(
                "Sync manager is already running".into(),
                ErrorCode::MethodNotAllowed
            ));
        }
        self.cancel.send_replace(false);

        let manager = self.clone();
        let mut cancel = self.cancel.subscribe();
        let period = self.config.tick_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = manager.sync_due_accounts().await {
                            warn!("Scheduled sync tick failed: {:?}", e);
                        }
                    }
                    _ = stop_requested(&mut cancel) => break,
                }
            }
            info!("Sync ticker stopped");
        }));
        info!(
            "Sync manager started, tick every {:?}, concurrency {}",
            period, self.config.concurrency
        );
        Ok(())
    }

    /// Cancels the ticker and the running syncs. Idempotent.
    pub async fn stop(&self) {
        let ticker = self.ticker.lock().await.take();
        self.cancel.send_replace(true);
        if let Some(handle) = ticker {
            if let Err(e) = handle.await {
                warn!("Sync ticker ended abnormally: {}", e);
            }
        }

        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} sync tasks still running after {:?}, aborting",
                tasks.len(),
                self.config.drain_timeout
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        // later on-demand syncs must not observe the stop request
        self.cancel.send_replace(false);
        info!("Sync manager stopped");
    }

    /// Spawns a supervised sync for every active account with sync enabled.
    /// Returns the number of spawned tasks without waiting for them.
    pub async fn sync_all_accounts(&self) -> MailFusionResult<usize> {
        let accounts: Vec<Account> = Account::list_all(self.engine.database())
            .await?
            .into_iter()
            .filter(Account::is_syncable)
            .collect();
        self.dispatch(accounts, SyncType::Manual).await
    }

    /// Tick body: only accounts whose `sync_interval` elapsed since the last success.
    async fn sync_due_accounts(&self) -> MailFusionResult<usize> {
        let now = utc_now!();
        let accounts: Vec<Account> = Account::list_all(self.engine.database())
            .await?
            .into_iter()
            .filter(|a| a.is_syncable() && is_due(a, now))
            .collect();
        self.dispatch(accounts, SyncType::Scheduled).await
    }

    async fn dispatch(&self, accounts: Vec<Account>, sync_type: SyncType) -> MailFusionResult<usize> {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}

        let mut spawned = 0;
        for account in accounts {
            // an in-flight sync of the same account already covers this request
            if self.locks.is_locked(&account.uid) {
                debug!(account_uid = %account.uid, "Sync already running, skipped");
                continue;
            }
            let engine = self.engine.clone();
            let locks = self.locks.clone();
            let permits = self.permits.clone();
            let mut cancel = self.cancel.subscribe();
            tasks.spawn(async move {
                let uid = account.uid;
                let permit = tokio::select! {
                    permit = permits.acquire_owned() => permit,
                    _ = stop_requested(&mut cancel) => return,
                };
                let Ok(_permit) = permit else { return };
                let Some(guard) = locks.try_acquire(&uid) else {
                    debug!(account_uid = %uid, "Sync already running, skipped");
                    return;
                };
                let result = engine.sync_account(&uid, sync_type, &mut cancel).await;
                drop(guard);
                if let Err(e) = release_deleted(&locks, &uid, result) {
                    warn!(account_uid = %uid, "Sync rejected: {}", e);
                }
            });
            spawned += 1;
        }
        debug!("Dispatched {} account syncs", spawned);
        Ok(spawned)
    }

    /// On-demand sync of one account; waits for any sync of it already in flight.
    pub async fn sync_account(
        &self,
        account_uid: &str,
        sync_type: SyncType,
    ) -> MailFusionResult<SyncLog> {
        let guard = self.locks.acquire(account_uid).await;
        let mut cancel = self.cancel.subscribe();
        let result = self
            .engine
            .sync_account(account_uid, sync_type, &mut cancel)
            .await;
        drop(guard);
        release_deleted(&self.locks, account_uid, result)
    }

    pub async fn test_account_connection(&self, account_uid: &str) -> MailFusionResult<()> {
        self.engine.test_connection(account_uid).await
    }
}

/// A sync that queued behind an account delete recreated the lock entry; drop it again.
fn release_deleted<T>(
    locks: &SyncLocks,
    account_uid: &str,
    result: MailFusionResult<T>,
) -> MailFusionResult<T> {
    if matches!(&result, Err(e) if e.code() == ErrorCode::ResourceNotFound) {
        locks.forget(account_uid);
    }
    result
}

fn is_due(account: &Account, now: i64) -> bool {
    let interval_ms = i64::from(account.sync_interval.max(1)) * 60 * 1000;
    match account.last_sync_at {
        Some(last) => now - last >= interval_ms,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_accounts() {
        let now = 10 * 60 * 1000;
        let mut account = Account {
            sync_interval: 5,
            ..Default::default()
        };
        assert!(is_due(&account, now));
        account.last_sync_at = Some(now - 4 * 60 * 1000);
        assert!(!is_due(&account, now));
        account.last_sync_at = Some(now - 5 * 60 * 1000);
        assert!(is_due(&account, now));
    }
}
