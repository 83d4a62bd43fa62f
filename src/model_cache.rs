//! Lazy, LRU-bounded handle store for ASR/MT/TTS engines.
//!
//! This is a deliberate redesign of the reference implementation's
//! `LazyModelLoader`: the source's `_loading_status` dict returns `None` to
//! a second caller racing the same key, and that caller is expected to
//! retry (poll). Here, a concurrent `get` for an in-flight key blocks on a
//! condition variable and is woken once the first load completes, sharing
//! its exact outcome — a strict single-flight guarantee with no polling.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio::task::JoinSet;

use crate::engines::{AsrEngine, MtEngine, TtsEngine};
use crate::error::ModelCacheError;

/// Unifies the three engine kinds behind one cacheable handle type so a
/// single `ModelCache` can hold ASR, MT, and TTS entries side by side.
#[derive(Clone)]
pub enum ModelHandle {
    Asr(Arc<dyn AsrEngine>),
    Mt(Arc<dyn MtEngine>),
    Tts(Arc<dyn TtsEngine>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Asr(String),
    Mt(String, String),
    Tts(String),
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKey::Asr(model) => write!(f, "asr:{model}"),
            ModelKey::Mt(src, dst) => write!(f, "mt:{src}->{dst}"),
            ModelKey::Tts(lang) => write!(f, "tts:{lang}"),
        }
    }
}

enum Slot<H> {
    Loading,
    Ready(Result<H, ModelCacheError>),
}

struct Entry<H> {
    slot: Slot<H>,
    last_used: u64,
}

struct Inner<H> {
    entries: HashMap<ModelKey, Entry<H>>,
    tick: u64,
}

/// `H` is expected to be a cheaply-cloneable handle (typically `Arc<T>`);
/// `refs` reports how many external holders remain so eviction can defer
/// past any in-flight worker still using a handle.
pub struct ModelCache<H: Clone> {
    capacity: usize,
    state: Mutex<Inner<H>>,
    cv: Condvar,
    refs: Box<dyn Fn(&H) -> usize + Send + Sync>,
    pub progress: Option<Box<dyn Fn(&str, f32) + Send + Sync>>,
}

impl<H: Clone> ModelCache<H> {
    pub fn new(capacity: usize, refs: impl Fn(&H) -> usize + Send + Sync + 'static) -> Self {
        Self {
            capacity,
            state: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
            cv: Condvar::new(),
            refs: Box::new(refs),
            progress: None,
        }
    }

    /// Fetch a handle for `key`, loading it via `loader` if absent. Blocks
    /// the caller until a handle is ready or the load fails; never returns
    /// a "try again" sentinel.
    pub fn get(
        &self,
        key: ModelKey,
        loader: impl FnOnce() -> Result<H, ModelCacheError>,
    ) -> Result<H, ModelCacheError> {
        loop {
            let mut guard = self.state.lock();
            guard.tick += 1;
            let tick = guard.tick;

            match guard.entries.get_mut(&key) {
                Some(entry) => match &entry.slot {
                    Slot::Ready(result) => {
                        entry.last_used = tick;
                        return result.clone();
                    }
                    Slot::Loading => {
                        self.cv.wait(&mut guard);
                        continue;
                    }
                },
                None => {
                    guard.entries.insert(
                        key.clone(),
                        Entry {
                            slot: Slot::Loading,
                            last_used: tick,
                        },
                    );
                    drop(guard);

                    let result = loader();

                    let mut guard = self.state.lock();
                    if let Some(entry) = guard.entries.get_mut(&key) {
                        entry.slot = Slot::Ready(result.clone());
                    }
                    self.cv.notify_all();
                    self.evict_if_needed(&mut guard);
                    return result;
                }
            }
        }
    }

    fn evict_if_needed(&self, guard: &mut Inner<H>) {
        while guard.entries.len() > self.capacity {
            let victim = guard
                .entries
                .iter()
                .filter_map(|(k, e)| match &e.slot {
                    Slot::Ready(Ok(handle)) if (self.refs)(handle) == 0 => {
                        Some((k.clone(), e.last_used))
                    }
                    Slot::Ready(Err(_)) => Some((k.clone(), e.last_used)),
                    _ => None,
                })
                .min_by_key(|(_, last_used)| *last_used)
                .map(|(k, _)| k);

            match victim {
                Some(key) => {
                    guard.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Load every supported (src, dst) pair plus ASR/TTS handles among
    /// `languages` concurrently, reporting per-pair errors in the returned
    /// map and combined progress as each load lands. Partial success is
    /// allowed; a failure for one pair does not abort the rest.
    pub async fn load_all<F>(
        self: Arc<Self>,
        languages: &[String],
        loader: F,
    ) -> HashMap<ModelKey, Result<(), ModelCacheError>>
    where
        H: Send + 'static,
        F: Fn(&ModelKey) -> Result<H, ModelCacheError> + Send + Sync + 'static,
    {
        let mut keys = Vec::new();
        for lang in languages {
            keys.push(ModelKey::Asr(lang.clone()));
            keys.push(ModelKey::Tts(lang.clone()));
        }
        for src in languages {
            for dst in languages {
                if src != dst {
                    keys.push(ModelKey::Mt(src.clone(), dst.clone()));
                }
            }
        }

        let total = keys.len().max(1);
        let loader = Arc::new(loader);
        let mut tasks: JoinSet<(ModelKey, Result<(), ModelCacheError>)> = JoinSet::new();
        for key in keys {
            let cache = self.clone();
            let loader = loader.clone();
            tasks.spawn_blocking(move || {
                let outcome = cache.get(key.clone(), || loader(&key));
                (key, outcome.map(|_| ()))
            });
        }

        let mut results = HashMap::new();
        let mut done = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let Ok((key, outcome)) = joined else {
                continue;
            };
            done += 1;
            if let Some(progress) = &self.progress {
                progress(&format!("loaded {key}"), done as f32 / total as f32 * 100.0);
            }
            results.insert(key, outcome);
        }
        results
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn second_get_for_same_key_reuses_first_load() {
        let cache: ModelCache<Arc<u32>> = ModelCache::new(10, |h| Arc::strong_count(h) - 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let h1 = cache
            .get(ModelKey::Asr("base".into()), || {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(42))
            })
            .unwrap();
        let h2 = cache
            .get(ModelKey::Asr("base".into()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(99))
            })
            .unwrap();
        assert_eq!(*h1, 42);
        assert_eq!(*h2, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn eviction_skips_referenced_entries() {
        let cache: ModelCache<Arc<u32>> = ModelCache::new(1, |h| Arc::strong_count(h) - 1);
        let kept = cache
            .get(ModelKey::Asr("a".into()), || Ok(Arc::new(1)))
            .unwrap();
        let _ = cache.get(ModelKey::Asr("b".into()), || Ok(Arc::new(2))).unwrap();
        // "a" is still externally held via `kept`, so eviction should have
        // removed nothing referenced; cache may grow past capacity rather
        // than evict a handle still in use.
        assert!(Arc::strong_count(&kept) >= 1);
    }
}
