// ===============================
// src/pool.rs
// ===============================
use std::collections::VecDeque;

use crate::domain::Ticket;

/// Capacity-bounded FIFO shared by every vendor and customer of a run.
///
/// The pool itself is not synchronized; it lives inside the run's `Market`
/// and every call happens under that lock, which makes each operation atomic
/// relative to the others.
#[derive(Debug)]
pub struct TicketPool {
    tickets: VecDeque<Ticket>,
    capacity: usize,
}

impl TicketPool {
    pub fn new(capacity: usize) -> Self {
        Self { tickets: VecDeque::new(), capacity }
    }

    /// Move up to `max` tickets from the front of `src` into the pool, bounded
    /// by remaining capacity. Returns how many moved; 0 means "pool full" (or
    /// nothing offered) and is not an error.
    pub fn try_enqueue_many(&mut self, src: &mut VecDeque<Ticket>, max: usize) -> usize {
        let n = max.min(self.remaining_capacity()).min(src.len());
        self.tickets.extend(src.drain(..n));
        debug_assert!(self.tickets.len() <= self.capacity);
        n
    }

    /// Oldest ticket, or `None` when the pool is empty.
    pub fn try_dequeue_one(&mut self) -> Option<Ticket> {
        self.tickets.pop_front()
    }

    pub fn size(&self) -> usize { self.tickets.len() }
    pub fn remaining_capacity(&self) -> usize { self.capacity.saturating_sub(self.tickets.len()) }
    pub fn is_empty(&self) -> bool { self.tickets.is_empty() }
}
