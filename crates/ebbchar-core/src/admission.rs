//! Admission control.
//!
//! A fixed number of slots gate how many sessions may be open at once. The
//! pool only offers a non-blocking acquire: callers either get a [`Permit`]
//! immediately or are told the device is busy. There is no queue and no
//! fairness between competing openers.
//!
//! # Invariants
//!
//! - `0 <= available <= capacity` at every observable point
//! - Each permit returns exactly one slot, either through
//!   [`Permit::release`] or when it is dropped
//! - The counter is the only state shared between sessions and is updated
//!   with compare-and-swap, never with a separate load and store

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::error::BrokerError;

/// Default number of concurrent sessions.
pub const DEFAULT_CAPACITY: usize = 5;

/// Shared counter, referenced by the controller and every live permit.
#[derive(Debug)]
struct SlotCounter {
    capacity: usize,
    available: AtomicUsize,
}

impl SlotCounter {
    fn take(&self) -> Result<(), BrokerError> {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| free.checked_sub(1))
            .map(|_| ())
            .map_err(|_| BrokerError::Busy { capacity: self.capacity })
    }

    fn give_back(&self) -> Result<(), BrokerError> {
        let capacity = self.capacity;
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| {
                (free < capacity).then_some(free + 1)
            })
            .map(|_| ())
            .map_err(|available| BrokerError::DoubleRelease { available, capacity })
    }
}

/// Bounded pool of admission slots.
///
/// Cloning the controller yields another handle to the same counter.
#[derive(Clone)]
pub struct AdmissionController {
    slots: Arc<SlotCounter>,
}

impl AdmissionController {
    /// Create a pool with `capacity` free slots.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, BrokerError> {
        if capacity == 0 {
            return Err(BrokerError::InvalidCapacity(capacity));
        }

        let slots = SlotCounter { capacity, available: AtomicUsize::new(capacity) };
        Ok(Self { slots: Arc::new(slots) })
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available.load(Ordering::Acquire)
    }

    /// Slots currently held by permits.
    pub fn outstanding(&self) -> usize {
        self.capacity().saturating_sub(self.available())
    }

    /// Take a slot without waiting.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Busy` if no slot is free. The counter is left
    /// untouched in that case.
    pub fn try_acquire(&self) -> Result<Permit, BrokerError> {
        self.slots.take()?;
        Ok(Permit::new(Arc::clone(&self.slots)))
    }

    /// Return the slot held by `permit`.
    ///
    /// The permit is consumed, so the same permit cannot be released twice.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::DoubleRelease` if the pool already has every slot
    /// free, which means some other path returned a slot it never took.
    pub fn release(&self, permit: Permit) -> Result<(), BrokerError> {
        debug_assert!(permit.belongs_to(self), "permit released into a foreign pool");
        permit.release()
    }

    /// Check that every slot has been returned.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::SlotLeak` with the number of permits still held.
    pub fn ensure_idle(&self) -> Result<(), BrokerError> {
        match self.outstanding() {
            0 => Ok(()),
            outstanding => Err(BrokerError::SlotLeak { outstanding }),
        }
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// One admission slot.
///
/// Dropping a permit without calling [`Permit::release`] still returns the
/// slot, so early returns and panics cannot leak capacity.
#[must_use = "dropping a permit immediately returns its slot"]
pub struct Permit {
    slots: Arc<SlotCounter>,
    /// Set by [`Permit::release`] so drop does not return the slot again.
    returned: bool,
}

impl Permit {
    fn new(slots: Arc<SlotCounter>) -> Self {
        Self { slots, returned: false }
    }

    /// Return the slot to its pool.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::DoubleRelease` if the pool is already full.
    pub fn release(mut self) -> Result<(), BrokerError> {
        self.returned = true;
        self.slots.give_back()
    }

    fn belongs_to(&self, controller: &AdmissionController) -> bool {
        Arc::ptr_eq(&self.slots, &controller.slots)
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        if let Err(e) = self.slots.give_back() {
            tracing::error!("Failed to return admission slot: {}", e);
        }
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").field("held", &!self.returned).finish()
    }
}
