//! Register workflow: publish the user's public key, then an empty profile.
//!
//! `CheckNotRegisteredStep` → `PutPublicKeyStep` → `PutInitialProfileStep`.
//! Both puts are compensating, so a failed profile write also takes the
//! public key back out of the store.

use async_trait::async_trait;

use hivesync_core::StoreError;
use hivesync_process::{
    next, CompensatingPut, EndChain, NextStep, Process, ProcessError, ProcessStep, PutHandler,
};

use crate::context::SyncEnv;
use crate::error::SyncError;
use crate::profile::UserProfile;

pub struct RegisterContext {
    pub env: SyncEnv,
    pub public_key: Vec<u8>,
}

/// Compensating write of the public key.
pub type PutPublicKeyStep = CompensatingPut<PublicKeyPut>;

/// Compensating write of the empty profile.
pub type PutInitialProfileStep = CompensatingPut<EndChain>;

pub fn register_process(env: SyncEnv, public_key: Vec<u8>) -> Process<RegisterContext> {
    let name = format!("register {}", env.user);
    Process::new(name, RegisterContext { env, public_key }, CheckNotRegisteredStep)
}

pub async fn register(env: SyncEnv, public_key: Vec<u8>) -> Result<(), SyncError> {
    let user = env.user.clone();
    register_process(env, public_key).run().await?;
    tracing::info!(user = %user, "registered");
    Ok(())
}

/// Refuse to overwrite an existing registration.
pub struct CheckNotRegisteredStep;

#[async_trait]
impl ProcessStep<RegisterContext> for CheckNotRegisteredStep {
    fn name(&self) -> &str {
        "check not registered"
    }

    async fn start(&mut self, ctx: &mut RegisterContext) -> Result<NextStep<RegisterContext>, ProcessError> {
        let key = ctx.env.public_key_key();
        if ctx.env.store.get(&key).await?.first_value().is_some() {
            return Err(SyncError::AlreadyRegistered(ctx.env.user.to_string()).into());
        }
        let public_key = std::mem::take(&mut ctx.public_key);
        next(PutPublicKeyStep::new(
            "put public key",
            ctx.env.store.clone(),
            key,
            public_key,
            PublicKeyPut,
        ))
    }

    async fn roll_back(&mut self, _ctx: &mut RegisterContext) {}
}

/// Continues with the initial profile once the key is stored.
pub struct PublicKeyPut;

#[async_trait]
impl PutHandler<RegisterContext> for PublicKeyPut {
    async fn on_put(
        &mut self,
        ctx: &mut RegisterContext,
        result: Result<(), StoreError>,
    ) -> Result<NextStep<RegisterContext>, ProcessError> {
        result?;
        let profile = UserProfile::new(ctx.env.user.clone()).to_bytes()?;
        next(
            PutInitialProfileStep::new(
                "put initial profile",
                ctx.env.store.clone(),
                ctx.env.profile_key(),
                profile,
                EndChain,
            )
            .verified(),
        )
    }
}
