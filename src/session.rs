use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{WalletError, WalletResult};
use crate::keys::KeyMaterial;

/// Default duration before an unlocked wallet automatically locks.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
struct UnlockedSession {
    // KeyMaterial zeroizes on drop; clearing the option is the lock.
    material: KeyMaterial,
    expires_at: Instant,
}

impl UnlockedSession {
    fn new(material: KeyMaterial, timeout: Duration) -> Self {
        Self {
            material,
            expires_at: Instant::now() + timeout,
        }
    }

    fn touch(&mut self, timeout: Duration) {
        self.expires_at = Instant::now() + timeout;
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct SessionState {
    unlocked: Option<UnlockedSession>,
    failed_attempts: u32,
    next_allowed_attempt: Option<Instant>,
    backoff_exponent: u32,
}

/// Owns the decrypted key material between unlock and lock.
///
/// The material never leaves this manager; callers borrow it through
/// [`SessionManager::with_unlocked`], which holds the write lock for the
/// duration of the closure so a concurrent `lock()` waits for in-flight
/// signing operations instead of clearing material out from under them.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    timeout: Duration,
    max_failed_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    max_backoff_exponent: u32,
}

impl SessionManager {
    pub fn new(timeout: Duration, max_failed_attempts: u32) -> Self {
        Self::with_backoff(
            timeout,
            max_failed_attempts,
            Duration::from_secs(1),
            Duration::from_secs(32),
        )
    }

    pub fn with_backoff(
        timeout: Duration,
        max_failed_attempts: u32,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            timeout,
            max_failed_attempts,
            backoff_base,
            backoff_cap,
            max_backoff_exponent: 8,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT, 5)
    }

    pub fn is_locked(&self) -> bool {
        let state = self.state.read();
        state.unlocked.is_none()
    }

    /// Install freshly decrypted key material, resetting failure tracking.
    pub fn unlock(&self, material: KeyMaterial) {
        let mut state = self.state.write();
        state.failed_attempts = 0;
        state.next_allowed_attempt = None;
        state.backoff_exponent = 0;
        state.unlocked = Some(UnlockedSession::new(material, self.timeout));
    }

    /// Record a failed unlock attempt and return remaining attempts.
    ///
    /// The backoff window throttles only this path: a failure inside the
    /// window is rejected without consuming an attempt, while a correct
    /// credential unlocks immediately regardless of the window.
    pub fn register_failed_attempt(&self) -> WalletResult<u32> {
        let mut state = self.state.write();
        let now = Instant::now();

        if let Some(until) = state.next_allowed_attempt {
            if now < until {
                let remaining = until.saturating_duration_since(now);
                return Err(WalletError::LockedOut(format!(
                    "retry in {}.{:03} seconds",
                    remaining.as_secs(),
                    remaining.subsec_millis()
                )));
            }
        }

        state.failed_attempts += 1;
        if state.failed_attempts >= self.max_failed_attempts {
            state.unlocked = None;
            state.next_allowed_attempt = None;
            state.backoff_exponent = 0;
            return Err(WalletError::LockedOut(
                "maximum unlock attempts exceeded".to_string(),
            ));
        }

        state.backoff_exponent = (state.backoff_exponent + 1).min(self.max_backoff_exponent);
        let multiplier = 1_u32 << state.backoff_exponent.saturating_sub(1);
        let mut delay = if multiplier <= 1 {
            self.backoff_base
        } else {
            self.backoff_base
                .checked_mul(multiplier)
                .unwrap_or(self.backoff_cap)
        };
        if delay > self.backoff_cap {
            delay = self.backoff_cap;
        }
        state.next_allowed_attempt = Some(now + delay);

        Ok(self.max_failed_attempts - state.failed_attempts)
    }

    /// Drop the in-memory key material. Idempotent.
    pub fn lock(&self) {
        let mut state = self.state.write();
        state.unlocked = None;
        state.next_allowed_attempt = None;
        state.backoff_exponent = 0;
    }

    /// Borrow the unlocked key material while refreshing the idle timeout.
    pub fn with_unlocked<F, T>(&self, operation: F) -> WalletResult<T>
    where
        F: FnOnce(&KeyMaterial) -> WalletResult<T>,
    {
        let mut state = self.state.write();
        let session = state.unlocked.as_mut().ok_or(WalletError::NotUnlocked)?;

        if session.is_expired() {
            state.unlocked = None;
            return Err(WalletError::NotUnlocked);
        }

        session.touch(self.timeout);
        operation(&session.material)
    }

    /// Borrow without extending the timeout (observers only).
    pub fn peek_unlocked<F, T>(&self, operation: F) -> WalletResult<T>
    where
        F: FnOnce(&KeyMaterial) -> WalletResult<T>,
    {
        let state = self.state.read();
        let session = state.unlocked.as_ref().ok_or(WalletError::NotUnlocked)?;

        if session.is_expired() {
            drop(state);
            self.lock();
            return Err(WalletError::NotUnlocked);
        }

        operation(&session.material)
    }

    pub fn remaining_attempts(&self) -> u32 {
        let state = self.state.read();
        self.max_failed_attempts
            .saturating_sub(state.failed_attempts)
    }
}
