//! Fan-out/join of independent blocking calls.
//!
//! ```
//! use libcephqe::parallel::parallel;
//!
//! let hosts = ["node1", "node2"];
//! let results = parallel(|p| {
//!     for host in &hosts {
//!         p.spawn(move || host.len());
//!     }
//! });
//! assert_eq!(results.len(), 2);
//! ```
use std::any::Any;

use crossbeam::thread::{Scope, ScopedJoinHandle};

#[derive(Debug, thiserror::Error)]
pub enum ParallelError {
    #[error("task {index} panicked: {message}")]
    Panicked { index: usize, message: String },
}

/// Handle used to spawn tasks inside a [`parallel`] block.
pub struct Parallel<'s, 'env, T> {
    scope: &'s Scope<'env>,
    handles: Vec<ScopedJoinHandle<'s, T>>,
}

impl<'s, 'env, T: Send + 'env> Parallel<'s, 'env, T> {
    /// Starts `task` on its own thread. Tasks may borrow from the caller.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: FnOnce() -> T + Send + 'env,
    {
        let index = self.handles.len();
        tracing::trace!(index, "spawning parallel task");
        self.handles.push(self.scope.spawn(move |_| task()));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Runs every task spawned by `f` concurrently and joins all of them
/// before returning. Results come back in spawn order; a panicking task
/// is reported as an error without affecting the others.
pub fn parallel<'env, T, F>(f: F) -> Vec<Result<T, ParallelError>>
where
    T: Send + 'env,
    F: FnOnce(&mut Parallel<'_, 'env, T>),
{
    crossbeam::thread::scope(|s| {
        let mut p = Parallel {
            scope: s,
            handles: Vec::new(),
        };
        f(&mut p);
        p.handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                handle.join().map_err(|payload| ParallelError::Panicked {
                    index,
                    message: panic_message(payload),
                })
            })
            .collect()
    })
    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

/// Flattens the results of fallible tasks, returning the first error met.
pub fn all_ok<T, E>(results: Vec<Result<Result<T, E>, ParallelError>>) -> Result<Vec<T>, E>
where
    E: From<ParallelError>,
{
    results
        .into_iter()
        .map(|r| r.map_err(E::from).and_then(|inner| inner))
        .collect()
}
