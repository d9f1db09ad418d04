//! Status lookup boundary

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PollError;
use crate::status::{OperationId, StatusReport};

/// One-shot status lookup for a tracked operation
///
/// Implementations wrap whatever REST client the host application uses; the
/// poller only needs the classified report. Lookup failures must come back
/// as [`PollError`] so they stay distinguishable from a business `Failed`.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, id: &OperationId) -> Result<StatusReport, PollError>;
}

#[async_trait]
impl<T: StatusSource + ?Sized> StatusSource for Arc<T> {
    async fn fetch(&self, id: &OperationId) -> Result<StatusReport, PollError> {
        (**self).fetch(id).await
    }
}

/// Adapt a plain async closure into a [`StatusSource`]
pub fn source_fn<F, Fut>(f: F) -> FnSource<F>
where
    F: Fn(OperationId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StatusReport, PollError>> + Send,
{
    FnSource(f)
}

/// See [`source_fn`]
pub struct FnSource<F>(F);

#[async_trait]
impl<F, Fut> StatusSource for FnSource<F>
where
    F: Fn(OperationId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StatusReport, PollError>> + Send,
{
    async fn fetch(&self, id: &OperationId) -> Result<StatusReport, PollError> {
        (self.0)(id.clone()).await
    }
}
