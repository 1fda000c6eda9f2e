//! Byte-budgeted cache groups with single-flight loading.
//!
//! A group maps string keys to immutable shared values. `get` returns a
//! cached value, joins an in-flight load for the same key, or starts one.
//! Loads run in a spawned task: a caller that goes away (request
//! cancellation) never cancels the load, so the other waiters and the
//! cache itself still get the value. Failed loads are broadcast to the
//! current waiters and are not cached; the next `get` retries.
//!
//! Eviction is least-recently-used down to the byte budget.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use rocket::tokio;
use rocket::tokio::sync::watch;

use crate::error::{Error, Result};

/// Byte accounting for cached values.
pub trait Weigh: Send + Sync + 'static {
    fn weight(&self) -> usize;
}

impl Weigh for Vec<u8> {
    fn weight(&self) -> usize {
        self.len()
    }
}

/// Fills a missing key. The context is whatever per-request data the load
/// needs beyond the key itself; callers that merely join an in-flight load
/// have theirs dropped unused.
#[rocket::async_trait]
pub trait Loader: Send + Sync + 'static {
    type Value: Weigh;
    type Context: Send + 'static;

    async fn load(&self, key: &str, ctx: Self::Context) -> Result<Self::Value>;
}

type Outcome<V> = Option<std::result::Result<Arc<V>, Error>>;

pub struct Group<L: Loader> {
    inner: Arc<Inner<L>>,
}

impl<L: Loader> Clone for Group<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<L: Loader> {
    name: &'static str,
    budget: usize,
    loader: L,
    state: Mutex<State<L::Value>>,
}

struct State<V> {
    ready: LruCache<String, Arc<V>>,
    total: usize,
    inflight: HashMap<String, watch::Receiver<Outcome<V>>>,
}

impl<L: Loader> Group<L> {
    pub fn new(name: &'static str, budget: usize, loader: L) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                budget,
                loader,
                state: Mutex::new(State {
                    ready: LruCache::unbounded(),
                    total: 0,
                    inflight: HashMap::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub async fn get(&self, key: &str, ctx: L::Context) -> Result<Arc<L::Value>> {
        let mut rx = {
            let mut state = self.inner.state.lock();

            if let Some(value) = state.ready.get(key) {
                debug!("{}: hit {:?}", self.inner.name, key);
                return Ok(value.clone());
            }

            if let Some(rx) = state.inflight.get(key) {
                debug!("{}: joining load of {:?}", self.inner.name, key);
                rx.clone()
            } else {
                debug!("{}: loading {:?}", self.inner.name, key);
                let (tx, rx) = watch::channel(None);
                state.inflight.insert(key.to_string(), rx.clone());

                let inner = self.inner.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    let result = inner.loader.load(&key, ctx).await.map(Arc::new);

                    let mut state = inner.state.lock();
                    state.inflight.remove(&key);
                    if let Ok(value) = &result {
                        state.insert(inner.name, inner.budget, &key, value.clone());
                    }
                    drop(state);
                    // Every waiter may be gone already; nothing to do then.
                    let _ = tx.send(Some(result));
                });

                rx
            }
        };

        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(Error::Internal(format!(
                    "{} loader for the key went away",
                    self.inner.name
                )));
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().ready.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes currently held.
    pub fn total_weight(&self) -> usize {
        self.inner.state.lock().total
    }
}

impl<V: Weigh> State<V> {
    fn insert(&mut self, name: &str, budget: usize, key: &str, value: Arc<V>) {
        let weight = value.weight();

        // Reinsertion under the same key replaces the old value.
        if let Some((_, old)) = self.ready.push(key.to_string(), value) {
            self.total -= old.weight();
        }
        self.total += weight;

        while self.total > budget {
            match self.ready.pop_lru() {
                Some((evicted, value)) => {
                    self.total -= value.weight();
                    debug!("{}: evicted {:?}", name, evicted);
                }
                None => break,
            }
        }
    }
}
