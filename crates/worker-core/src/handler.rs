use std::sync::Arc;

use async_trait::async_trait;

use crate::request::RequestStream;
use crate::response::ResponseStream;

/// The request/response pair handed to an event handler. Shared with the
/// session manager (which pushes into the request stream and reads
/// `is_closed` off the response stream) via `Arc`.
pub type Request = Arc<RequestStream>;
pub type Response = Arc<ResponseStream>;

/// Application code registered for a named event. A handler's return value
/// is ignored; an uncaught panic or error is reported to the daemon as
/// `EUNCAUGHTEXCEPTION` by the single completion trap the session manager
/// attaches — handlers themselves never need to touch the response
/// stream's terminal state on the error path.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: Request, response: Response);
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn call(&self, request: Request, response: Response) {
        (self)(request, response).await
    }
}
