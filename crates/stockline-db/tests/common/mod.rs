#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use stockline_core::{AdjustRequest, Product};
use stockline_db::{Database, DbConfig, Stopwatch};
use tempfile::TempDir;

/// File-backed database with a real connection pool, removed on drop.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DbConfig::new(dir.path().join("stockline_test.db"))
            .max_connections(8)
            .busy_timeout(Duration::from_secs(10));
        let db = Database::new(config).await.expect("db connect");
        TestDb { db, _dir: dir }
    }

    pub async fn product(&self, sku: &str, category: Option<&str>) -> Product {
        self.db
            .products()
            .create(sku, None, sku, category)
            .await
            .expect("create product")
    }

    pub async fn stock(&self, product_id: &str, location_id: &str, quantity: i64) {
        self.db
            .ledger()
            .adjust(AdjustRequest::new(
                product_id,
                location_id,
                quantity,
                "opening stock",
                "test",
            ))
            .await
            .expect("opening stock");
    }

    pub async fn quantity(&self, product_id: &str, location_id: &str) -> i64 {
        self.db
            .ledger()
            .get(product_id, location_id)
            .await
            .expect("read stock")
            .map(|r| r.quantity)
            .unwrap_or(0)
    }
}

/// Advances by `step` every time it is read; the first read is zero.
pub struct SteppingStopwatch {
    reads: AtomicU32,
    step: Duration,
}

impl SteppingStopwatch {
    pub fn new(step: Duration) -> Self {
        SteppingStopwatch {
            reads: AtomicU32::new(0),
            step,
        }
    }
}

impl Stopwatch for SteppingStopwatch {
    fn elapsed(&self) -> Duration {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst);
        self.step * reads
    }
}
