// ==============================================
// MEMOIZING CACHE CONCURRENCY TESTS (integration)
// ==============================================
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

mod at_most_once {
    use parakit::cache::MemoizingCache;

    use super::*;

    #[test]
    fn test_concurrent_misses_share_one_computation() {
        let num_threads = 16;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = MemoizingCache::from_fn(move |key: &u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so most callers arrive while computing
            thread::sleep(Duration::from_millis(20));
            Arc::new(key.to_string())
        });
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_value(&42).unwrap()
                })
            })
            .collect();
        let results: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for value in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], value));
        }
    }

    #[test]
    fn test_concurrent_futures_share_one_computation() {
        let num_threads = 8;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = MemoizingCache::from_fn(move |key: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            key + 1
        });
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_future(&1)
                })
            })
            .collect();
        let futures: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for future in &futures {
            assert!(future.ptr_eq(&futures[0]));
            assert_eq!(future.wait().unwrap(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_keys_compute_independently() {
        let num_threads = 8;
        let keys_per_thread = 50;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = MemoizingCache::from_fn(move |key: &usize| {
            counter.fetch_add(1, Ordering::SeqCst);
            key * 2
        });
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    // Every thread walks the same key range
                    for key in 0..keys_per_thread {
                        assert_eq!(cache.get_value(&key).unwrap(), key * 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), keys_per_thread);
        assert_eq!(cache.len(), keys_per_thread);
    }

    #[test]
    fn test_eviction_forces_recompute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = MemoizingCache::from_fn(move |_: &&'static str| {
            counter.fetch_add(1, Ordering::SeqCst) + 1
        });

        assert_eq!(cache.get_value(&"k").unwrap(), 1);
        assert_eq!(cache.get_value(&"k").unwrap(), 1);
        assert!(cache.remove(&"k"));
        assert_eq!(cache.get_value(&"k").unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_is_replayed_to_every_waiter() {
        let num_threads = 6;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = MemoizingCache::new(move |_: &u8| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            Err::<u8, _>("backend unavailable")
        });
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_value(&9).unwrap_err().to_string()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().contains("backend unavailable"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

mod speculative {
    use parakit::cache::SpeculativeCache;

    use super::*;

    #[test]
    fn test_related_keys_are_prefetched_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = SpeculativeCache::from_fn(
            move |key: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                key * 10
            },
            |key: &u32| vec![key + 1],
        );

        // Sequential "page" reads: each request prefetches the next page
        for page in 0..10 {
            assert_eq!(cache.get_value(&page).unwrap(), page * 10);
            cache.wait_prefetch_idle();
            assert!(cache.contains_key(&(page + 1)));
        }
        // Read through the inner cache so no further prefetch is published
        assert_eq!(cache.inner().get_future(&10).wait().unwrap(), 100);

        // pages 0..=10 computed once each
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_callers_are_not_blocked_by_prefetch() {
        let release = Arc::new(AtomicBool::new(false));
        let gate = release.clone();
        let cache = SpeculativeCache::from_fn(
            move |key: &u32| {
                if *key > 0 {
                    // Related keys are slow
                    while !gate.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                *key
            },
            |_: &u32| vec![1, 2, 3],
        );

        assert_eq!(cache.get_value(&0).unwrap(), 0);
        release.store(true, Ordering::SeqCst);
        cache.wait_prefetch_idle();
        for key in 1..=3 {
            assert_eq!(cache.get_future(&key).wait().unwrap(), key);
        }
    }
}

mod web {
    use parakit::cache::WebCache;

    use super::*;

    #[test]
    fn test_failed_fetch_heals_for_later_requests() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let cache = WebCache::new(move |uri: &str| {
            // First attempt fails, later ones succeed
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(std::io::Error::other("connection reset"))
            } else {
                Ok(Some(format!("contents of {uri}")))
            }
        });

        assert!(cache.get_value("https://example.test/a").is_err());
        assert!(!cache.contains_key("https://example.test/a"));
        assert_eq!(
            cache.get_value("https://example.test/a").unwrap(),
            "contents of https://example.test/a"
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_requests_share_failure_then_retry() {
        let num_threads = 6;
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let cache = WebCache::new(move |_: &str| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            if attempt == 0 { Ok(None) } else { Ok::<_, std::io::Error>(Some("ok".to_string())) }
        });
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let _ = cache.get_value("mem://shared");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // After the burst the entry is either healed or absent, never a cached failure
        match cache.get_value("mem://shared") {
            Ok(body) => assert_eq!(body, "ok"),
            Err(err) => panic!("failure stayed cached: {err}"),
        }
    }
}
