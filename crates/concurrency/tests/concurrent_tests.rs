//! Concurrent/Multi-threaded Tests for docbase-concurrency
//!
//! These tests verify correct behavior under actual concurrent execution:
//!
//! 1. **Lock Exclusivity** - writers never overlap each other or readers
//! 2. **Shared Reads** - readers on the same target do overlap
//! 3. **Pool Bounds** - concurrent borrowers never exceed max_connections
//! 4. **Transactions Under Load** - concurrent transactions commit or abort cleanly
//!
//! ## Running These Tests
//!
//! ```bash
//! cargo test --test concurrent_tests
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use docbase_concurrency::{ConnectionPool, LockCoordinator, PoolConfig, TransactionManager};
use docbase_core::{CollectionPath, DocumentName, Error, LockMode, Principal};
use docbase_storage::{HierarchicalStore, LockTable};

// ============================================================================
// Test Helpers
// ============================================================================

const LONG: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn coordinator() -> Arc<LockCoordinator> {
    Arc::new(LockCoordinator::new(Arc::new(LockTable::new()), LONG))
}

fn docs() -> CollectionPath {
    CollectionPath::parse("/db/docs").unwrap()
}

fn doc_name() -> DocumentName {
    DocumentName::new("shared.xml").unwrap()
}

// ============================================================================
// SECTION 1: Lock Exclusivity
// ============================================================================

mod lock_exclusivity {
    use super::*;

    #[test]
    fn test_document_writers_never_overlap() {
        init_tracing();
        let locks = coordinator();
        let inside = Arc::new(AtomicBool::new(false));
        let entries = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let entries = Arc::clone(&entries);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for _ in 0..10 {
                        locks
                            .with_collection_lock(&docs(), LockMode::Read, |c| {
                                c.with_document_lock(&doc_name(), LockMode::Write, |_| {
                                    assert!(
                                        !inside.swap(true, Ordering::SeqCst),
                                        "two writers inside the document lock"
                                    );
                                    thread::sleep(Duration::from_micros(200));
                                    inside.store(false, Ordering::SeqCst);
                                    entries.fetch_add(1, Ordering::SeqCst);
                                    Ok(())
                                })
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(entries.load(Ordering::SeqCst), 80);
    }

    #[test]
    fn test_writer_excludes_readers() {
        init_tracing();
        let locks = coordinator();
        let writer_inside = Arc::new(AtomicBool::new(false));
        let start = Arc::new(Barrier::new(5));

        let writer = {
            let locks = Arc::clone(&locks);
            let writer_inside = Arc::clone(&writer_inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..20 {
                    locks
                        .with_collection_lock(&docs(), LockMode::Write, |_| {
                            writer_inside.store(true, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(300));
                            writer_inside.store(false, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let writer_inside = Arc::clone(&writer_inside);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for _ in 0..20 {
                        locks
                            .with_collection_lock(&docs(), LockMode::Read, |_| {
                                assert!(
                                    !writer_inside.load(Ordering::SeqCst),
                                    "reader observed an in-flight writer"
                                );
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}

// ============================================================================
// SECTION 2: Shared Reads
// ============================================================================

mod shared_reads {
    use super::*;

    /// Both readers must be inside the lock at the same time to pass the barrier
    #[test]
    fn test_readers_overlap() {
        init_tracing();
        let locks = coordinator();
        let inside_together = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside_together = Arc::clone(&inside_together);
                thread::spawn(move || {
                    locks.with_collection_lock(&docs(), LockMode::Read, |c| {
                        c.with_document_lock(&doc_name(), LockMode::Read, |_| {
                            inside_together.wait();
                            Ok(())
                        })
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }
}

// ============================================================================
// SECTION 3: Pool Bounds
// ============================================================================

mod pool_bounds {
    use super::*;

    #[test]
    fn test_borrowers_never_exceed_max() {
        init_tracing();
        let pool = Arc::new(
            ConnectionPool::new(
                Arc::new(HierarchicalStore::new()),
                PoolConfig {
                    min_connections: 1,
                    max_connections: 3,
                    borrow_timeout: LONG,
                },
            )
            .unwrap(),
        );
        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let in_use = Arc::clone(&in_use);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _conn = pool.borrow(Principal::System).unwrap();
                        let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(200));
                        in_use.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert!(stats.total <= 3);
    }
}

// ============================================================================
// SECTION 4: Transactions Under Load
// ============================================================================

mod transactions_under_load {
    use super::*;
    use docbase_storage::DocumentContent;

    #[test]
    fn test_concurrent_transactions_commit_and_abort() {
        init_tracing();
        let store = Arc::new(HierarchicalStore::new());
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&store), PoolConfig::default()).unwrap());
        let manager = Arc::new(TransactionManager::new());
        let locks = Arc::new(LockCoordinator::new(Arc::clone(store.locks()), LONG));

        {
            let mut conn = pool.borrow(Principal::System).unwrap();
            manager
                .run(&mut conn, |txn| txn.create_collection(&docs()).map(|_| ()))
                .unwrap();
        }

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let pool = Arc::clone(&pool);
                let manager = Arc::clone(&manager);
                let locks = Arc::clone(&locks);
                thread::spawn(move || {
                    let mut conn = pool.borrow(Principal::System).unwrap();
                    let name = DocumentName::new(format!("doc-{}.bin", i)).unwrap();
                    manager.run(&mut conn, |txn| {
                        locks.with_collection_lock(&docs(), LockMode::Write, |c| {
                            c.with_document_lock(&name, LockMode::Write, |d| {
                                let blob = txn.put_blob(b"payload")?;
                                txn.put_document(
                                    d.collection_path(),
                                    d.name(),
                                    "application/octet-stream",
                                    DocumentContent::Binary { blob_id: blob, length: 7 },
                                )?;
                                if i % 2 == 1 {
                                    return Err(Error::validation("odd documents are rejected"));
                                }
                                Ok(())
                            })
                        })
                    })
                })
            })
            .collect();

        let outcomes: Vec<bool> = handles
            .into_iter()
            .map(|h| h.join().unwrap().is_ok())
            .collect();
        assert_eq!(outcomes, vec![true, false, true, false, true, false]);

        let names = store.document_names(&docs()).unwrap();
        let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["doc-0.bin", "doc-2.bin", "doc-4.bin"]);
        assert_eq!(store.blobs().len(), 3);

        let stats = manager.stats();
        assert_eq!(stats.committed, 4);
        assert_eq!(stats.aborted, 3);
        assert_eq!(stats.active, 0);
    }
}
