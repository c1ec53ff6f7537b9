//! Per-reservation serialization.
//!
//! Every mutation of one reservation's money state runs while holding that
//! reservation's lock. Different reservations never contend: there is one
//! mutex per reservation, created on demand and dropped once unused.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use rental_types::ReservationId;

type LockMap = DashMap<ReservationId, Arc<Mutex<()>>>;

#[derive(Default, Clone)]
pub struct ReservationLocks {
    locks: Arc<LockMap>,
}

impl ReservationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`. Callers queue in FIFO order.
    pub async fn acquire(&self, id: ReservationId) -> ReservationGuard {
        let mutex = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        ReservationGuard {
            id,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Number of reservations with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds a reservation's lock until dropped.
pub struct ReservationGuard {
    id: ReservationId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references the mutex: nobody holds or awaits it.
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_reservation_is_serialized() {
        let locks = ReservationLocks::new();
        let id = ReservationId::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_reservations_do_not_block() {
        let locks = ReservationLocks::new();
        let _a = locks.acquire(ReservationId::new()).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(ReservationId::new()),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
