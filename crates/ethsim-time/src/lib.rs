//! Cooperative tick scheduler.
//!
//! The simulator advances in discrete ticks. Device engines register a job a number of ticks in
//! the future; each call to [`TickScheduler::advance`] moves time forward by one tick and hands
//! back every job that has become due, in the order it was scheduled. A job that wants to run
//! again must re-register itself.
#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;

/// Scheduler shared between the simulator loop and the devices that register jobs.
pub type SharedTickScheduler<J> = Rc<RefCell<TickScheduler<J>>>;

#[derive(Debug, Clone)]
pub struct TickScheduler<J> {
    now: u64,
    next_seq: u64,
    // Keyed by (due tick, insertion sequence) so jobs due on the same tick keep FIFO order.
    queue: BTreeMap<(u64, u64), J>,
}

impl<J> Default for TickScheduler<J> {
    fn default() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            queue: BTreeMap::new(),
        }
    }
}

impl<J: Copy + PartialEq + Debug> TickScheduler<J> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTickScheduler<J> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Register `job` to run `delay` ticks from now. A delay of zero is treated as one: a job
    /// never runs in the tick that registered it.
    pub fn schedule(&mut self, job: J, delay: u64) {
        let due = self.now.saturating_add(delay.max(1));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((due, seq), job);
    }

    /// Remove every pending registration of `job`. Returns how many were removed.
    pub fn cancel(&mut self, job: J) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, pending| *pending != job);
        before - self.queue.len()
    }

    pub fn is_scheduled(&self, job: J) -> bool {
        self.queue.values().any(|pending| *pending == job)
    }

    /// Number of pending registrations of `job`.
    pub fn count(&self, job: J) -> usize {
        self.queue.values().filter(|pending| **pending == job).count()
    }

    /// Advance time by one tick and remove and return the jobs that are now due.
    pub fn advance(&mut self) -> Vec<J> {
        self.now += 1;
        let later = self.queue.split_off(&(self.now + 1, 0));
        let due = std::mem::replace(&mut self.queue, later);
        due.into_values().collect()
    }
}
