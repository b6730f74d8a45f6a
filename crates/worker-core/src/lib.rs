mod config;
mod dispatcher;
mod error;
mod handler;
mod liveness;
mod queue;
mod request;
mod response;
mod session;
mod worker;

pub use config::WorkerConfig;
pub use dispatcher::{Dispatcher, Event};
pub use error::{WorkerError, errno};
pub use handler::{Handler, Request, Response};
pub use liveness::{DisownTimer, Watchdog};
pub use queue::AsyncQueue;
pub use request::{RequestError, RequestStream};
pub use response::ResponseStream;
pub use session::SessionManager;
pub use worker::Worker;

pub use worker_proto::ProtocolVersion;
