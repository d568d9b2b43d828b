//! Cooperative scheduler for pending render work.
//!
//! All asynchronous reconciliation (component futures, async iterator
//! pull loops, pending-subtree joins) runs on one thread-local
//! single-threaded pool. Nothing drives it ambiently; embedders pump it
//! with [`flush`] whenever they want pending updates applied. Work is
//! interleaved cooperatively - suspension points are awaits, never
//! preemption.

use std::cell::{Cell, RefCell};
use std::future::Future;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use tracing::error;

struct Scheduler {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    pumping: Cell<bool>,
}

thread_local! {
    static SCHEDULER: Scheduler = {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Scheduler {
            pool: RefCell::new(pool),
            spawner,
            pumping: Cell::new(false),
        }
    };
}

/// Queue a task on the thread's render pool.
pub(crate) fn spawn(future: impl Future<Output = ()> + 'static) {
    SCHEDULER.with(|scheduler| {
        if let Err(err) = scheduler.spawner.spawn_local(future) {
            error!("failed to spawn render task: {err}");
        }
    });
}

/// Run queued render work until no task can make further progress.
///
/// Re-entrant calls (a component calling `flush` while the pool is
/// already running) are no-ops; the outer pump picks the work up.
pub fn flush() {
    SCHEDULER.with(|scheduler| {
        if scheduler.pumping.replace(true) {
            return;
        }
        scheduler.pool.borrow_mut().run_until_stalled();
        scheduler.pumping.set(false);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_flush_runs_spawned_tasks() {
        let ran = Rc::new(Cell::new(false));
        let ran2 = ran.clone();
        spawn(async move {
            ran2.set(true);
        });
        assert!(!ran.get(), "spawned work is inert until flushed");
        flush();
        assert!(ran.get());
    }

    #[test]
    fn test_flush_runs_tasks_spawned_by_tasks() {
        let ran = Rc::new(Cell::new(false));
        let ran2 = ran.clone();
        spawn(async move {
            spawn(async move {
                ran2.set(true);
            });
        });
        flush();
        assert!(ran.get(), "nested spawns drain in the same flush");
    }
}
