// ABOUTME: Shared helpers for runner integration tests
// ABOUTME: A scripted in-memory invoker and a progress recorder

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adcopy_runner::remote::Invoker;
use adcopy_runner::scheduler::{Job, JobStatus};
use futures::future::BoxFuture;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};

pub const COMMAND: &str = "generateAdCopy";

/// Echoes each job back the way the remote script does, with scripted failures.
#[derive(Default)]
pub struct ScriptedInvoker {
    failing: HashSet<u64>,
    malformed: HashSet<u64>,
    wrong_id: HashSet<u64>,
    panicking: HashSet<u64>,
    gate: Option<Arc<Semaphore>>,
    ungated: HashSet<u64>,
    max_delay_ms: Option<u64>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, ids: &[u64]) -> Self {
        self.failing.extend(ids);
        self
    }

    pub fn malformed(mut self, ids: &[u64]) -> Self {
        self.malformed.extend(ids);
        self
    }

    pub fn wrong_id(mut self, ids: &[u64]) -> Self {
        self.wrong_id.extend(ids);
        self
    }

    pub fn panicking(mut self, ids: &[u64]) -> Self {
        self.panicking.extend(ids);
        self
    }

    /// Every call waits for a permit before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// These ids answer right away even when the invoker is gated.
    pub fn ungated(mut self, ids: &[u64]) -> Self {
        self.ungated.extend(ids);
        self
    }

    pub fn random_delay(mut self, max_ms: u64) -> Self {
        self.max_delay_ms = Some(max_ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn answer(&self, payload: String) -> Result<String, String> {
        let mut job: Value = serde_json::from_str(&payload).map_err(|e| e.to_string())?;
        let id = job["id"].as_u64().ok_or("missing id")?;

        if let Some(gate) = self.gate.as_ref().filter(|_| !self.ungated.contains(&id)) {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(max_ms) = self.max_delay_ms {
            let ms = rand::thread_rng().gen_range(0..=max_ms);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if self.panicking.contains(&id) {
            panic!("scripted panic for job {}", id);
        }
        if self.malformed.contains(&id) {
            return Ok("<html>Service Unavailable</html>".to_string());
        }
        if self.wrong_id.contains(&id) {
            job["id"] = json!(id + 100);
            return Ok(job.to_string());
        }

        job["startedAt"] = json!("2026-01-05T10:00:00Z");
        job["endedAt"] = json!("2026-01-05T10:00:05Z");
        if let (Some(start), Some(end)) = (job["startRow"].as_u64(), job["endRow"].as_u64()) {
            job["rowsWritten"] = json!(end - start + 1);
        }

        if self.failing.contains(&id) {
            job["error"] = json!("model overloaded");
            return Err(job.to_string());
        }
        Ok(job.to_string())
    }
}

impl Invoker for ScriptedInvoker {
    fn invoke<'a>(
        &'a self,
        _command: &'a str,
        payload: String,
    ) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = self.answer(payload).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

/// Progress callback that forwards every transition to a channel.
pub fn progress_channel<P>() -> (
    impl FnMut(&Job<P>) + Send + 'static,
    mpsc::UnboundedReceiver<Job<P>>,
)
where
    P: Clone + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |job: &Job<P>| {
        let _ = tx.send(job.clone());
    };
    (callback, rx)
}

/// Read progress events until `count` of them have `status`.
pub async fn wait_for_status<P>(
    rx: &mut mpsc::UnboundedReceiver<Job<P>>,
    status: JobStatus,
    count: usize,
) -> Vec<Job<P>> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.len() < count {
            let job = rx.recv().await.expect("progress channel closed");
            if job.status == status {
                seen.push(job);
            }
        }
    })
    .await
    .expect("timed out waiting for progress");
    seen
}
