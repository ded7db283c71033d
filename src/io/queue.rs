use std::fmt;

use crate::error::{Error, ErrorKind, Result};

/// Ownership state of a single buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Owned by the application, holds no frame
    Free,
    /// Owned by the driver, waiting to be filled
    Queued,
    /// Owned by the application, holds a filled frame
    Ready,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Free => write!(f, "free"),
            State::Queued => write!(f, "queued"),
            State::Ready => write!(f, "ready"),
        }
    }
}

/// Tracks which side owns each buffer of a pool
///
/// The driver offers no way to ask whether a buffer is queued, so the state is kept here and every
/// transition is checked before the corresponding call is made.
#[derive(Debug, Clone)]
pub struct Queue {
    states: Vec<State>,
}

impl Queue {
    /// Returns a queue with `count` free buffers
    pub fn new(count: usize) -> Self {
        Queue {
            states: vec![State::Free; count],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: u32) -> Option<State> {
        self.states.get(index as usize).copied()
    }

    /// Number of buffers currently owned by the driver
    pub fn queued(&self) -> usize {
        self.states.iter().filter(|s| **s == State::Queued).count()
    }

    /// Indices of all buffers in the given state, in index order
    pub fn indices(&self, state: State) -> impl Iterator<Item = u32> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(move |(_, s)| **s == state)
            .map(|(i, _)| i as u32)
    }

    /// Checks that `index` may be handed to the driver
    ///
    /// Free buffers and consumed Ready buffers may be queued; a buffer already owned by the
    /// driver may not.
    pub fn check_enqueue(&self, index: u32) -> Result<()> {
        match self.state(index) {
            None => Err(Error::Buffer {
                index,
                reason: "index out of range",
                kind: ErrorKind::BadArgument,
            }),
            Some(State::Queued) => Err(Error::Buffer {
                index,
                reason: "already queued",
                kind: ErrorKind::BadArgument,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Records that the driver accepted `index`
    pub fn enqueue(&mut self, index: u32) -> Result<()> {
        self.check_enqueue(index)?;
        self.states[index as usize] = State::Queued;
        Ok(())
    }

    /// Records that the driver returned `index` filled
    ///
    /// The index comes from the driver, so violations are reported as system errors.
    pub fn complete(&mut self, index: u32) -> Result<()> {
        match self.state(index) {
            None => Err(Error::Buffer {
                index,
                reason: "driver returned an index out of range",
                kind: ErrorKind::System,
            }),
            Some(State::Queued) => {
                self.states[index as usize] = State::Ready;
                Ok(())
            }
            Some(_) => Err(Error::Buffer {
                index,
                reason: "driver returned a buffer that was not queued",
                kind: ErrorKind::System,
            }),
        }
    }

    /// Stream-off returns every buffer to the application
    pub fn reset(&mut self) {
        for state in &mut self.states {
            *state = State::Free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_free() {
        let queue = Queue::new(4);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.queued(), 0);
        assert_eq!(queue.indices(State::Free).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_cycle() {
        let mut queue = Queue::new(2);
        queue.enqueue(1).unwrap();
        assert_eq!(queue.state(1), Some(State::Queued));

        queue.complete(1).unwrap();
        assert_eq!(queue.state(1), Some(State::Ready));

        // requeue after consumption
        queue.enqueue(1).unwrap();
        assert_eq!(queue.state(1), Some(State::Queued));
        assert_eq!(queue.queued(), 1);
    }

    #[test]
    fn double_queue_is_rejected() {
        let mut queue = Queue::new(3);
        queue.enqueue(0).unwrap();

        let err = queue.enqueue(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
        assert_eq!(queue.state(0), Some(State::Queued));
    }

    #[test]
    fn out_of_range() {
        let mut queue = Queue::new(2);
        assert_eq!(queue.enqueue(2).unwrap_err().kind(), ErrorKind::BadArgument);
        assert_eq!(queue.complete(5).unwrap_err().kind(), ErrorKind::System);
    }

    #[test]
    fn complete_requires_queued() {
        let mut queue = Queue::new(2);
        assert_eq!(queue.complete(0).unwrap_err().kind(), ErrorKind::System);

        queue.enqueue(0).unwrap();
        queue.complete(0).unwrap();
        assert!(queue.complete(0).is_err());
    }

    #[test]
    fn reset_frees_everything() {
        let mut queue = Queue::new(3);
        queue.enqueue(0).unwrap();
        queue.enqueue(1).unwrap();
        queue.complete(1).unwrap();

        queue.reset();
        assert_eq!(queue.queued(), 0);
        assert_eq!(queue.indices(State::Free).count(), 3);
    }
}
