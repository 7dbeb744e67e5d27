//! Per-principal and per-IP resource limits (spec §5's "resource policy").
//!
//! Per-IP is a request-rate quota (`governor`, the same crate and pattern
//! a comparable axum service in the reference pack uses for its
//! rate-limit middleware); per-principal is a concurrency cap on
//! simultaneous pushes, since two parallel pushes from the same token are
//! a client bug or abuse far more often than legitimate parallelism.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Holds an acquired concurrency slot for the lifetime of one push;
/// dropping it returns the slot to the per-principal semaphore.
pub struct ConcurrencyGuard {
    _permit: OwnedSemaphorePermit,
}

pub struct ConcurrencyLimiter {
    per_principal: usize,
    pushers: DashMap<Uuid, Arc<Semaphore>>,
    ip_requests: IpRateLimiter,
}

impl ConcurrencyLimiter {
    pub fn new(per_principal_concurrent_pushes: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(50).unwrap()).allow_burst(NonZeroU32::new(100).unwrap());
        Self {
            per_principal: per_principal_concurrent_pushes.max(1) as usize,
            pushers: DashMap::new(),
            ip_requests: RateLimiter::keyed(quota),
        }
    }

    /// `Err(())` means the caller's IP is over its request-rate quota;
    /// the HTTP front-end turns this into a `429`.
    pub fn check_ip(&self, ip: IpAddr) -> Result<(), ()> {
        self.ip_requests.check_key(&ip).map_err(|_| ())
    }

    /// Acquire one of `per_principal_concurrent_pushes` slots for
    /// `principal_id`'s in-flight pushes. Held for the duration of a
    /// single `receive_pack` call; never across a connection's lifetime,
    /// so a client that fetches repeatedly without pushing never
    /// contends for this at all.
    pub async fn acquire_push_slot(&self, principal_id: Uuid) -> ConcurrencyGuard {
        let sem = self
            .pushers
            .entry(principal_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_principal)))
            .clone();
        let permit = sem.acquire_owned().await.expect("semaphore is never closed");
        ConcurrencyGuard { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_slot_waits_for_first_to_release() {
        let limiter = ConcurrencyLimiter::new(1);
        let principal = Uuid::new_v4();

        let first = limiter.acquire_push_slot(principal).await;
        let second_fut = limiter.acquire_push_slot(principal);
        tokio::pin!(second_fut);

        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), &mut second_fut)
            .await
            .is_err());

        drop(first);
        let _second = tokio::time::timeout(std::time::Duration::from_millis(50), second_fut)
            .await
            .expect("slot should free up once the first guard drops");
    }

    #[test]
    fn ip_quota_rejects_once_burst_is_exhausted() {
        let limiter = ConcurrencyLimiter::new(4);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let mut rejected = false;
        for _ in 0..200 {
            if limiter.check_ip(ip).is_err() {
                rejected = true;
                break;
            }
        }
        assert!(rejected, "expected the burst quota to eventually reject");
    }
}
