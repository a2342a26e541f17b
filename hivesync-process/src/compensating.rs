//! A single store write guarded by a compensating remove.
//!
//! [`CompensatingPut`] owns the mechanics (put, optional read-back, remove on
//! failure); a [`PutHandler`] owns the application-specific reactions, in
//! particular which step follows a successful write.

use std::sync::Arc;

use async_trait::async_trait;

use hivesync_core::{AsyncStore, GetResponse, StoreError, StoreKey};

use crate::error::ProcessError;
use crate::step::{NextStep, ProcessStep};

/// How far the guarded write got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// `start` never issued the put; rollback has nothing to undo.
    NotWritten,
    /// The put was issued (successfully or not) and may have landed.
    Written,
    /// The compensating remove was issued.
    RolledBack,
}

/// Reactions to the outcome of each store primitive of a [`CompensatingPut`].
#[async_trait]
pub trait PutHandler<C: Send>: Send {
    /// Reaction to the put. Returning an error triggers the rollback.
    ///
    /// Default: end the chain on success, fail otherwise.
    async fn on_put(
        &mut self,
        _ctx: &mut C,
        result: Result<(), StoreError>,
    ) -> Result<NextStep<C>, ProcessError> {
        result?;
        Ok(None)
    }

    /// Reaction to the read-back of a [`CompensatingPut::verified`] write.
    ///
    /// Default: at least one replica must return a value.
    async fn on_get(
        &mut self,
        _ctx: &mut C,
        key: &StoreKey,
        result: Result<GetResponse, StoreError>,
    ) -> Result<(), ProcessError> {
        if result?.first_value().is_some() {
            Ok(())
        } else {
            Err(ProcessError::failed(format!("{key} is not readable after put")))
        }
    }

    /// Reaction to the compensating remove. Must not fail.
    async fn on_remove(&mut self, _ctx: &mut C, key: &StoreKey, result: Result<(), StoreError>) {
        match result {
            Ok(()) => tracing::debug!(key = %key, "compensating remove done"),
            Err(err) => tracing::warn!(key = %key, error = %err, "compensating remove failed"),
        }
    }
}

/// Handler with every default reaction: the write is the last step.
#[derive(Debug, Default, Clone, Copy)]
pub struct EndChain;

#[async_trait]
impl<C: Send> PutHandler<C> for EndChain {}

/// Put `value` under `key`; on failure, remove `key` again.
pub struct CompensatingPut<H> {
    name: String,
    store: Arc<dyn AsyncStore>,
    key: StoreKey,
    value: Vec<u8>,
    verify: bool,
    handler: H,
    state: WriteState,
}

impl<H> CompensatingPut<H> {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn AsyncStore>,
        key: StoreKey,
        value: Vec<u8>,
        handler: H,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            key,
            value,
            verify: false,
            handler,
            state: WriteState::NotWritten,
        }
    }

    /// Read the key back after a successful put and let the handler judge it.
    pub fn verified(mut self) -> Self {
        self.verify = true;
        self
    }

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    async fn compensate<C: Send>(&mut self, ctx: &mut C)
    where
        H: PutHandler<C>,
    {
        match self.state {
            WriteState::NotWritten => {
                tracing::debug!(key = %self.key, "rollback before put, nothing to compensate");
            }
            WriteState::RolledBack => {}
            WriteState::Written => {
                self.state = WriteState::RolledBack;
                let result = self.store.remove(&self.key).await;
                self.handler.on_remove(ctx, &self.key, result).await;
            }
        }
    }
}

#[async_trait]
impl<C, H> ProcessStep<C> for CompensatingPut<H>
where
    C: Send,
    H: PutHandler<C>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, ctx: &mut C) -> Result<NextStep<C>, ProcessError> {
        tracing::debug!(key = %self.key, bytes = self.value.len(), "put");
        let result = self.store.put(&self.key, self.value.clone()).await;
        self.state = WriteState::Written;

        if result.is_ok() && self.verify {
            let read = self.store.get(&self.key).await;
            if let Err(err) = self.handler.on_get(ctx, &self.key, read).await {
                tracing::warn!(key = %self.key, error = %err, "put verification failed");
                self.compensate(ctx).await;
                return Err(err);
            }
        }

        match self.handler.on_put(ctx, result).await {
            Ok(next) => Ok(next),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "put failed, compensating");
                self.compensate(ctx).await;
                Err(err)
            }
        }
    }

    async fn roll_back(&mut self, ctx: &mut C) {
        self.compensate(ctx).await;
    }
}
