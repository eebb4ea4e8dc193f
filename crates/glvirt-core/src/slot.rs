//! Completion slot for blocking round trips.
//!
//! A slot is a producer-allocated payload region plus a one-word completion
//! flag. It has exactly one waiter (the producer) and one notifier (the
//! consumer executing the blocking command):
//!
//! 1. producer: [`ResponseSlot::reset`] stores flag 0;
//! 2. consumer: [`ResponseSlot::complete`] writes the payload, then stores a
//!    non-zero flag with release ordering and wakes the waiter;
//! 3. producer: [`ResponseSlot::wait`] blocks until the flag leaves 0, then
//!    [`ResponseSlot::take_payload`] moves the bytes out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::SlotError;

const PENDING: u32 = 0;
const COMPLETE: u32 = 1;

#[derive(Debug, Default)]
pub struct ResponseSlot {
    flag: AtomicU32,
    payload: Mutex<Vec<u8>>,
    ready: Condvar,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot for another round trip.
    pub fn reset(&self) {
        self.payload.lock().clear();
        self.flag.store(PENDING, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.flag.load(Ordering::Acquire) != PENDING
    }

    /// Publish `bytes` and wake the waiting producer.
    pub fn complete(&self, bytes: Vec<u8>) {
        let mut payload = self.payload.lock();
        *payload = bytes;
        self.flag.store(COMPLETE, Ordering::Release);
        drop(payload);
        self.ready.notify_one();
    }

    /// Block until the slot is completed. `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), SlotError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut payload = self.payload.lock();
        while !self.is_complete() {
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut payload, deadline).timed_out()
                        && !self.is_complete()
                    {
                        return Err(SlotError::TimedOut);
                    }
                }
                None => self.ready.wait(&mut payload),
            }
        }
        Ok(())
    }

    /// Move the completed payload out, leaving the region empty.
    pub fn take_payload(&self) -> Result<Vec<u8>, SlotError> {
        if !self.is_complete() {
            return Err(SlotError::NotComplete);
        }
        Ok(std::mem::take(&mut *self.payload.lock()))
    }
}
