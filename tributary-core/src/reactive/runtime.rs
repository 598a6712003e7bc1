//! Reactive Runtime
//!
//! The runtime owns the deferred execution slot used by batched containers.
//! A batched container does not dispatch when it is written; it queues a
//! flush here, and the flush runs once the current synchronous unit of work
//! is over.
//!
//! # How It Works
//!
//! 1. `notify` on a batched container queues one microtask per tick.
//!
//! 2. The host ends its unit of work by calling [`run_microtasks`], or wraps
//!    the work in [`tick`] which does so automatically.
//!
//! 3. Microtasks run in the order they were queued. A task queued while the
//!    queue is draining (for example a derived container reacting to its
//!    source's flush) runs in the same drain.
//!
//! The queue is thread-local. Containers are single-threaded in practice;
//! a flush runs on whichever thread drains the queue it was scheduled on.

use std::cell::RefCell;
use std::collections::VecDeque;

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
}

/// Queue `task` to run at the end of the current unit of work.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Number of microtasks waiting to run.
pub fn pending_microtasks() -> usize {
    MICROTASKS.with(|queue| queue.borrow().len())
}

/// Run queued microtasks until the queue is empty.
///
/// Returns the number of tasks that ran.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    loop {
        // Pop without holding the borrow so tasks can queue more work.
        let next = MICROTASKS.with(|queue| queue.borrow_mut().pop_front());
        match next {
            Some(task) => {
                task();
                ran += 1;
            }
            None => break,
        }
    }
    if ran > 0 {
        tracing::trace!(ran, "drained microtasks");
    }
    ran
}

/// Run `f` as one synchronous unit of work, then drain the microtask queue.
pub fn tick<R>(f: impl FnOnce() -> R) -> R {
    let result = f();
    run_microtasks();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::cell::Cell;

    #[test]
    fn microtasks_are_deferred_until_drained() {
        let ran = Rc::new(Cell::new(0));
        let ran_clone = ran.clone();

        queue_microtask(move || ran_clone.set(ran_clone.get() + 1));
        assert_eq!(ran.get(), 0);
        assert_eq!(pending_microtasks(), 1);

        assert_eq!(run_microtasks(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(pending_microtasks(), 0);
    }

    #[test]
    fn tasks_queued_while_draining_run_in_same_drain() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();

        queue_microtask(move || {
            outer.borrow_mut().push(1);
            let inner = outer.clone();
            queue_microtask(move || inner.borrow_mut().push(3));
        });
        let second = order.clone();
        queue_microtask(move || second.borrow_mut().push(2));

        assert_eq!(run_microtasks(), 3);
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn tick_drains_after_work() {
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        let value = tick(|| {
            queue_microtask(move || ran_clone.set(true));
            42
        });

        assert_eq!(value, 42);
        assert!(ran.get());
    }
}
