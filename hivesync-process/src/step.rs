//! The unit of work of a [`Process`](crate::Process).

use async_trait::async_trait;

use crate::error::ProcessError;

/// The step a finished step hands over to; `None` ends the chain.
pub type NextStep<C> = Option<Box<dyn ProcessStep<C>>>;

/// A named unit of work sharing the context `C` with the rest of its chain.
///
/// Contract:
/// - `start` is called exactly once. It returns the next step (`Ok(Some)`),
///   marks the chain terminal (`Ok(None)`), or fails. A failing step rolls
///   *itself* back before returning the error; the chain then compensates the
///   steps that completed before it.
/// - `roll_back` is called at most once by the chain, but must be idempotent
///   and safe to call when `start` never ran or never completed.
#[async_trait]
pub trait ProcessStep<C: Send>: Send {
    fn name(&self) -> &str;

    async fn start(&mut self, ctx: &mut C) -> Result<NextStep<C>, ProcessError>;

    async fn roll_back(&mut self, ctx: &mut C);
}

/// Box a step as the next step of a chain.
pub fn next<C, S>(step: S) -> Result<NextStep<C>, ProcessError>
where
    C: Send,
    S: ProcessStep<C> + 'static,
{
    Ok(Some(Box::new(step)))
}

/// End the chain successfully.
pub fn done<C: Send>() -> Result<NextStep<C>, ProcessError> {
    Ok(None)
}
