// ABOUTME: Remote execution of batch jobs
// ABOUTME: Defines the invoker seam the runner dispatches through, plus the HTTP implementation

pub mod client;
pub mod models;

use futures::future::BoxFuture;

pub use client::RemoteClient;
pub use models::{BatchPayload, ErrorPayload};

/// Issues one remote call per job.
///
/// `payload` is the job serialized as JSON. On success the future yields the
/// job echoed back by the remote side (same `id`, possibly annotated with
/// `startedAt`, `endedAt` and results). On failure it yields a serialized
/// error payload, ideally carrying the same `id` and an `error` field.
pub trait Invoker: Send + Sync {
    fn invoke<'a>(&'a self, command: &'a str, payload: String)
        -> BoxFuture<'a, Result<String, String>>;
}
