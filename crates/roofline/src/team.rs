//! Fork-join teams sharing a barrier.
//!
//! A window is opened and closed by every member of a team together; the
//! members meet at a barrier between the protocol phases. A team is either
//! spawned here ([`Team::run`] on scoped threads, [`Team::broadcast`] on every
//! rayon worker) or assembled by the caller from [`Team::member`] handles
//! passed to threads it already runs.

use std::fmt;
use std::sync::{Arc, Barrier};

/// A fixed-size group of cooperating threads.
#[derive(Clone)]
pub struct Team {
    size: usize,
    barrier: Arc<Barrier>,
}

impl Team {
    /// Team of `size` members (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            barrier: Arc::new(Barrier::new(size)),
        }
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Handle for the member at `index`.
    ///
    /// Every index in `0..size` must be handed to exactly one thread, and
    /// every member must take part in each barrier, or the team deadlocks.
    pub fn member(&self, index: usize) -> TeamMember {
        debug_assert!(index < self.size);
        TeamMember {
            index,
            size: self.size,
            barrier: Arc::clone(&self.barrier),
        }
    }

    /// Run `f` on `size` scoped threads, one per member, and collect the
    /// results in member order.
    pub fn run<F, T>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(TeamMember) -> T + Sync,
        T: Send,
    {
        let team = Team::new(size);
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..team.size)
                .map(|index| {
                    let member = team.member(index);
                    scope.spawn(move || f(member))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(value) => value,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    /// Run `f` once on every thread of the current rayon pool, each as one
    /// member of a team spanning the pool.
    ///
    /// Must not be called from inside the pool.
    pub fn broadcast<F, T>(f: F) -> Vec<T>
    where
        F: Fn(TeamMember) -> T + Sync,
        T: Send,
    {
        let team = Team::new(rayon::current_num_threads());
        rayon::broadcast(|ctx| f(team.member(ctx.index())))
    }
}

impl fmt::Debug for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Team").field("size", &self.size).finish()
    }
}

/// One thread's handle on its team.
#[derive(Clone)]
pub struct TeamMember {
    index: usize,
    size: usize,
    barrier: Arc<Barrier>,
}

impl TeamMember {
    /// A team of one, member index 0.
    pub fn solo() -> Self {
        Self {
            index: 0,
            size: 1,
            barrier: Arc::new(Barrier::new(1)),
        }
    }

    /// Position in the team.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Team size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Block until every member has arrived. Returns true on exactly one
    /// member per barrier episode.
    pub fn wait(&self) -> bool {
        self.barrier.wait().is_leader()
    }
}

impl fmt::Debug for TeamMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeamMember")
            .field("index", &self.index)
            .field("size", &self.size)
            .finish()
    }
}
