//! Thread-shared filter. One `RwLock` covers all K arrays, so a reader never
//! sees an insert that has reached some arrays but not others.
use crate::config::FilterConfig;
use crate::consts::FilterMode;
use crate::errors::Result;
use crate::filter::{MultiHashBloomFilter, Outcome};
use crate::hash::{FlowHasher, Xxh3Hasher};
use crate::key::FlowKey;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct SharedFilter<H = Xxh3Hasher> {
    inner: RwLock<MultiHashBloomFilter<H>>,
}

impl SharedFilter<Xxh3Hasher> {
    pub fn new(config: FilterConfig) -> Result<Self> {
        Ok(Self::from_filter(MultiHashBloomFilter::new(config)?))
    }
}

// A poisoned lock still guards a valid filter: bits only go false -> true.
impl<H: FlowHasher> SharedFilter<H> {
    pub fn from_filter(filter: MultiHashBloomFilter<H>) -> Self {
        Self { inner: RwLock::new(filter) }
    }

    fn read(&self) -> RwLockReadGuard<'_, MultiHashBloomFilter<H>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MultiHashBloomFilter<H>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: &FlowKey) {
        self.write().insert(key);
    }

    pub fn query(&self, key: &FlowKey) -> bool {
        self.read().query(key)
    }

    pub fn apply(&self, mode: FilterMode, key: &FlowKey) -> Outcome {
        match mode {
            FilterMode::Insert => self.write().apply(mode, key),
            FilterMode::Query => Outcome::Queried { member: self.query(key) },
        }
    }

    pub fn reset(&self) {
        self.write().reset();
    }

    /// Folds a worker-local filter into the shared one.
    pub fn absorb(&self, local: &MultiHashBloomFilter<H>) -> Result<()> {
        self.write().merge(local)
    }

    pub fn into_inner(self) -> MultiHashBloomFilter<H> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: FlowHasher + Clone> SharedFilter<H> {
    /// Consistent copy taken under the read lock.
    pub fn snapshot(&self) -> MultiHashBloomFilter<H> {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn concurrent_inserts_all_visible() {
        let shared = SharedFilter::new(FilterConfig::new(4096, 3)).unwrap();
        thread::scope(|s| {
            for w in 0..4u16 {
                let shared = &shared;
                s.spawn(move || {
                    for i in 0..250u16 {
                        shared.insert(&FlowKey::new(w, i));
                    }
                });
            }
        });
        for w in 0..4u16 {
            for i in 0..250u16 {
                assert!(shared.query(&FlowKey::new(w, i)));
            }
        }
    }

    #[test]
    fn readers_never_see_false_negative_after_insert() {
        const KEYS: usize = 500;
        let shared = SharedFilter::new(FilterConfig::new(4096, 3)).unwrap();
        // number of inserts that have returned
        let done = AtomicUsize::new(0);
        thread::scope(|s| {
            let (writer, published) = (&shared, &done);
            s.spawn(move || {
                for i in 0..KEYS {
                    writer.insert(&FlowKey::new(i as u16, 9));
                    published.store(i + 1, Ordering::Release);
                }
            });
            for _ in 0..2 {
                let (reader, published) = (&shared, &done);
                s.spawn(move || {
                    loop {
                        let upto = published.load(Ordering::Acquire);
                        for i in 0..upto {
                            assert!(
                                reader.query(&FlowKey::new(i as u16, 9)),
                                "key {i} missing after its insert returned"
                            );
                        }
                        if upto == KEYS {
                            break;
                        }
                        thread::yield_now();
                    }
                });
            }
        });
    }

    #[test]
    fn worker_local_merge() {
        let shared = SharedFilter::new(FilterConfig::default()).unwrap();
        let locals: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..3u16)
                .map(|w| {
                    s.spawn(move || {
                        let mut local = MultiHashBloomFilter::new(FilterConfig::default()).unwrap();
                        local.insert(&FlowKey::new(w, 100 + w));
                        local
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for l in &locals {
            shared.absorb(l).unwrap();
        }
        for w in 0..3u16 {
            assert!(shared.query(&FlowKey::new(w, 100 + w)));
        }
        let copy = shared.snapshot();
        assert_eq!(copy.count_ones(), shared.into_inner().count_ones());
    }

    #[test]
    fn apply_and_reset() {
        let shared = SharedFilter::new(FilterConfig::default()).unwrap();
        let k = FlowKey::new(80, 8080);
        assert_eq!(shared.apply(FilterMode::Insert, &k), Outcome::Inserted);
        assert_eq!(shared.apply(FilterMode::Query, &k), Outcome::Queried { member: true });
        shared.reset();
        assert!(!shared.query(&k));
    }
}
