use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{Error, Result};

pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Hash(e.to_string()))
}

/// Constant-time verification against a stored PHC-format hash.
pub fn verify_password(stored_hash: &str, plain: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// In-memory failed-attempt tracker, keyed by principal id, enforcing an
/// exponential lockout window after repeated failures. This is a
/// single-process cache: a fleet of auth-resolving instances shares no
/// state, so a determined attacker can spread attempts across replicas.
/// The metadata store's own audit log is the durable record; this exists
/// to blunt casual brute-forcing against any one instance.
pub struct LockoutTracker {
    state: Mutex<HashMap<String, LockoutState>>,
    base_delay: Duration,
    max_delay: Duration,
    threshold: u32,
}

struct LockoutState {
    failures: u32,
    locked_until: Option<Instant>,
}

impl Default for LockoutTracker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(300))
    }
}

impl LockoutTracker {
    pub fn new(threshold: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            base_delay,
            max_delay,
            threshold,
        }
    }

    /// Returns `Err(Locked)` if this principal is currently locked out.
    pub fn check(&self, principal_key: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if let Some(entry) = state.get(principal_key) {
            if let Some(until) = entry.locked_until {
                let now = Instant::now();
                if now < until {
                    return Err(Error::Locked {
                        retry_after_secs: (until - now).as_secs(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn record_failure(&self, principal_key: &str) {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(principal_key.to_string()).or_insert(LockoutState {
            failures: 0,
            locked_until: None,
        });
        entry.failures += 1;
        if entry.failures >= self.threshold {
            let extra = entry.failures - self.threshold;
            let delay = self.base_delay * 2u32.saturating_pow(extra).min(1 << 16);
            entry.locked_until = Some(Instant::now() + delay.min(self.max_delay));
        }
    }

    pub fn record_success(&self, principal_key: &str) {
        self.state.lock().unwrap().remove(principal_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password(&hash, "correct horse battery staple"));
        assert!(!verify_password(&hash, "wrong"));
    }

    #[test]
    fn distinct_hashes_for_same_password() {
        let a = hash_password("hunter2").unwrap();
        let b = hash_password("hunter2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn lockout_engages_after_threshold() {
        let tracker = LockoutTracker::new(3, Duration::from_millis(10), Duration::from_secs(1));
        for _ in 0..2 {
            tracker.record_failure("alice");
            assert!(tracker.check("alice").is_ok());
        }
        tracker.record_failure("alice");
        assert!(tracker.check("alice").is_err());
    }

    #[test]
    fn success_clears_lockout_state() {
        let tracker = LockoutTracker::new(1, Duration::from_secs(60), Duration::from_secs(600));
        tracker.record_failure("bob");
        assert!(tracker.check("bob").is_err());
        tracker.record_success("bob");
        assert!(tracker.check("bob").is_ok());
    }
}
