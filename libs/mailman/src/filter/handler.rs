//! Filter callbacks

use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Callback invoked by the dispatcher for a matched message
///
/// Errors are logged and counted by the dispatcher; they never stop the
/// remaining callbacks or the dispatch loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;

    /// Name used in log events
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a callback; one callback may serve several filters
pub type Callback = Arc<dyn MessageHandler>;

/// Adapts an async closure into a [`MessageHandler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        (self.f)(message.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a callback
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Callback
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
