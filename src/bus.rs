//! Shared I2C bus handle and scoped acquisition
//!
//! A [`SharedBus`] wraps one physical bus behind a binary lock. Drivers never
//! touch the transport directly: they take a [`BusGuard`] for the duration of
//! one transaction and the guard releases the lock when it goes out of scope,
//! on the success path, on `?` early returns and on panic unwinding alike.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::trace;

use crate::error::Result;
use crate::poll::{PollBudget, PollPolicy};

/// Addressed, bidirectional bus transport
///
/// Anything that can push bytes to and pull bytes from a 7-bit device
/// address qualifies: a Linux `/dev/i2c-N` adapter, a USB bridge, or a test
/// double. Locking is handled by [`SharedBus`], not by the transport.
pub trait I2cTransport {
    /// Write `bytes` to the device at `address`
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()>;

    /// Fill `buffer` with bytes read from the device at `address`
    fn read_into(&mut self, address: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write `bytes`, then read into `buffer`
    ///
    /// The default issues two independent transfers. Transports that support
    /// a repeated START should override this.
    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.write(address, bytes)?;
        self.read_into(address, buffer)
    }
}

/// Cloneable handle to one physical bus
///
/// Every clone refers to the same transport and the same lock.
pub struct SharedBus<T> {
    transport: Arc<Mutex<T>>,
    lock_policy: Arc<PollPolicy>,
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            lock_policy: Arc::clone(&self.lock_policy),
        }
    }
}

impl<T: I2cTransport> SharedBus<T> {
    /// Wrap a transport using the default (bounded) lock wait
    pub fn new(transport: T) -> Self {
        Self::with_lock_policy(transport, PollPolicy::default())
    }

    /// Wrap a transport with an explicit lock wait policy
    pub fn with_lock_policy(transport: T, lock_policy: PollPolicy) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            lock_policy: Arc::new(lock_policy),
        }
    }

    /// Policy applied by [`acquire`](Self::acquire)
    pub fn lock_policy(&self) -> &PollPolicy {
        &self.lock_policy
    }

    /// Take the lock if it is free right now
    pub fn try_acquire(&self) -> Option<BusGuard<'_, T>> {
        let guard = match self.transport.try_lock() {
            Ok(guard) => guard,
            // A panic inside a previous scope leaves nothing half-written on
            // our side; the lock itself is still sound.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        trace!("bus lock acquired");
        Some(BusGuard { guard })
    }

    /// Spin until the lock is obtained or the lock policy gives up
    ///
    /// # Returns
    /// * `Ok(BusGuard)` - Exclusive access until the guard is dropped
    /// * `Err(SensorError::BusContentionTimeout)` - Lock policy exhausted
    /// * `Err(SensorError::Cancelled)` - Lock policy cancellation flag set
    pub fn acquire(&self) -> Result<BusGuard<'_, T>> {
        let mut budget = PollBudget::start(&self.lock_policy, "bus lock");

        loop {
            if let Some(guard) = self.try_acquire() {
                return Ok(guard);
            }
            budget.retry()?;
        }
    }

    /// Run `operation` with exclusive access to the transport
    pub fn transaction<R, F>(&self, operation: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let mut guard = self.acquire()?;
        operation(&mut guard)
    }
}

/// Exclusive access to the transport, released on drop
pub struct BusGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for BusGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for BusGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for BusGuard<'_, T> {
    fn drop(&mut self) {
        trace!("bus lock released");
    }
}
