//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify, Semaphore};

use feedcache::feed::{ResolveError, ResolvedItem, ResolvedSource, Resolver};
use feedcache::RefreshEvent;

/// Resolver with canned answers per URL. Unknown URLs fail to parse.
#[derive(Default)]
pub struct FakeResolver {
    answers: Mutex<HashMap<String, Result<ResolvedSource, String>>>,
    calls: AtomicUsize,
    /// When set, each resolution waits for a permit.
    gate: Option<Arc<Semaphore>>,
    pub started: Notify,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every resolution blocks until `gate` hands out a permit.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn succeed(&self, url: &str, title: &str, items: Vec<ResolvedItem>) {
        self.answers.lock().unwrap().insert(
            url.to_string(),
            Ok(ResolvedSource {
                title: title.to_string(),
                items,
            }),
        );
    }

    pub fn fail(&self, url: &str, error: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, url: &str) -> Result<ResolvedSource, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let answer = self.answers.lock().unwrap().get(url).cloned();
        match answer {
            Some(Ok(resolved)) => Ok(resolved),
            Some(Err(error)) => Err(ResolveError::Parse(error)),
            None => Err(ResolveError::Parse(format!("no canned answer for {url}"))),
        }
    }
}

pub fn item(url: &str, published_at: Option<chrono::DateTime<chrono::Utc>>) -> ResolvedItem {
    ResolvedItem {
        title: format!("Title of {url}"),
        description: String::new(),
        url: url.to_string(),
        published_at,
        updated_at: None,
    }
}

pub fn day(y: i32, m: u32, d: u32) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single()
}

/// Next event, or panic after `within`.
pub async fn next_event(
    events: &mut broadcast::Receiver<RefreshEvent>,
    within: Duration,
) -> RefreshEvent {
    tokio::time::timeout(within, events.recv())
        .await
        .expect("timed out waiting for refresh event")
        .expect("event channel closed")
}

/// Skip events until one matches.
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<RefreshEvent>,
    within: Duration,
    mut matches: F,
) -> RefreshEvent
where
    F: FnMut(&RefreshEvent) -> bool,
{
    loop {
        let event = next_event(events, within).await;
        if matches(&event) {
            return event;
        }
    }
}
