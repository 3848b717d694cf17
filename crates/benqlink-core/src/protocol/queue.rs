//! Command/response correlation queue
//!
//! Pairs every outgoing command with the matcher for the response it should
//! produce. The device protocol carries no request identifier, so FIFO order
//! is the only correlation key: the oldest unresolved matcher is always the
//! one an incoming message is tested against.
//!
//! Commands and matchers are stored together as one entry, so the two sides
//! can never drift apart. An entry stays in the queue from submission until
//! its response arrives (or the queue is cleared); `transmitted` counts how
//! many of the oldest entries have already had their command handed out.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ProtocolError;

#[derive(Debug)]
struct Entry<C, R> {
    command: C,
    response: R,
}

#[derive(Debug)]
struct Inner<C, R> {
    entries: VecDeque<Entry<C, R>>,
    /// Number of leading entries whose command has been taken for transmission
    transmitted: usize,
}

impl<C, R> Inner<C, R> {
    fn take_next_command(&mut self) -> Option<C>
    where
        C: Clone,
    {
        let entry = self.entries.get(self.transmitted)?;
        self.transmitted += 1;
        Some(entry.command.clone())
    }

    fn pop_front(&mut self) -> Option<R> {
        let entry = self.entries.pop_front()?;
        self.transmitted = self.transmitted.saturating_sub(1);
        Some(entry.response)
    }
}

/// Outcome of resolving the oldest outstanding entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<C> {
    /// Next command to put on the wire, if one was waiting
    pub next_command: Option<C>,
    /// Unresolved entries left after the resolution
    pub remaining: usize,
}

/// Thread-safe, capacity-bounded FIFO of (command, expected response) pairs
#[derive(Debug)]
pub struct CorrelationQueue<C, R> {
    inner: Mutex<Inner<C, R>>,
    capacity: usize,
}

impl<C: Clone, R: Clone> CorrelationQueue<C, R> {
    /// Create an empty queue holding at most `capacity` unresolved entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                transmitted: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C, R>> {
        // Every critical section leaves the queue consistent, so a poisoned
        // lock still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of unresolved entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a command and its expected response
    pub fn enqueue(&self, command: C, response: R) -> Result<(), ProtocolError> {
        let mut inner = self.lock();
        if inner.entries.len() >= self.capacity {
            return Err(ProtocolError::QueueFull {
                capacity: self.capacity,
            });
        }
        inner.entries.push_back(Entry { command, response });
        Ok(())
    }

    /// Enqueue, and if the new entry is the only unresolved one, take its
    /// command for immediate transmission.
    pub fn submit(&self, command: C, response: R) -> Result<Option<C>, ProtocolError> {
        let mut inner = self.lock();
        if inner.entries.len() >= self.capacity {
            return Err(ProtocolError::QueueFull {
                capacity: self.capacity,
            });
        }
        inner.entries.push_back(Entry { command, response });
        if inner.entries.len() == 1 {
            Ok(inner.take_next_command())
        } else {
            Ok(None)
        }
    }

    /// Take the oldest command that has not been handed out for transmission
    pub fn dequeue_command(&self) -> Result<C, ProtocolError> {
        self.lock()
            .take_next_command()
            .ok_or(ProtocolError::QueueEmpty)
    }

    /// Remove and return the oldest expected response
    pub fn dequeue_response(&self) -> Result<R, ProtocolError> {
        self.lock().pop_front().ok_or(ProtocolError::QueueEmpty)
    }

    /// Oldest command not yet handed out, without taking it
    pub fn peek_command(&self) -> Option<C> {
        let inner = self.lock();
        inner
            .entries
            .get(inner.transmitted)
            .map(|e| e.command.clone())
    }

    /// Oldest expected response, without removing it
    pub fn peek_response(&self) -> Option<R> {
        self.lock().entries.front().map(|e| e.response.clone())
    }

    /// If the oldest expected response satisfies `accept`, remove it and take
    /// the next waiting command. Returns `None` when the queue is empty or the
    /// oldest response was not accepted, leaving the queue untouched.
    pub fn resolve_front<F>(&self, accept: F) -> Option<Resolution<C>>
    where
        F: FnOnce(&R) -> bool,
    {
        let mut inner = self.lock();
        let front = inner.entries.front()?;
        if !accept(&front.response) {
            return None;
        }
        inner.pop_front();
        let next_command = inner.take_next_command();
        Some(Resolution {
            next_command,
            remaining: inner.entries.len(),
        })
    }

    /// True when no command is waiting to be transmitted
    pub fn is_command_empty(&self) -> bool {
        self.command_count() == 0
    }

    /// True when no response is outstanding
    pub fn is_response_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Commands still waiting to be transmitted
    pub fn command_count(&self) -> usize {
        let inner = self.lock();
        inner.entries.len() - inner.transmitted
    }

    /// Responses still outstanding (transmitted or not)
    pub fn response_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Number of (command, response) pairs held
    pub fn len(&self) -> usize {
        self.response_count()
    }

    /// True when nothing is held
    pub fn is_empty(&self) -> bool {
        self.is_response_empty()
    }

    /// Drop every entry, transmitted or not
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.transmitted = 0;
    }
}
