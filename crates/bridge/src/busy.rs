use std::{cell::Cell, rc::Rc};

/// Reentrant counter suppressing UI reconciliation while a batch of commands runs.
///
/// Only ever touched from the worker thread.
#[derive(Debug, Clone, Default)]
pub struct BusyDepth(Rc<Cell<usize>>);

impl BusyDepth {
    pub fn is_busy(&self) -> bool {
        self.0.get() > 0
    }

    pub fn depth(&self) -> usize {
        self.0.get()
    }

    /// Enter a busy scope, left when the guard drops (including while unwinding)
    pub fn enter(&self) -> BusyGuard {
        self.0.set(self.0.get() + 1);
        BusyGuard(self.clone())
    }

    fn leave(&self) {
        match self.0.get().checked_sub(1) {
            Some(depth) => self.0.set(depth),
            None => tracing::error!("busy depth released below zero"),
        }
    }
}

#[must_use = "the busy scope ends when the guard is dropped"]
#[derive(Debug)]
pub struct BusyGuard(BusyDepth);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.leave();
    }
}
