//! Resolving and pinning the CPU a thread runs on.
//!
//! The sampler attributes each thread's window to the leaf hardware thread it
//! is bound to. Resolution follows two steps:
//!
//! 1. If the thread's affinity mask holds exactly one CPU, that CPU.
//! 2. Otherwise the CPU the thread is running on right now (`sched_getcpu`).
//!
//! Unpinned threads may migrate between start and stop; pin them first
//! (for example with [`AffinityGuard::pin`]) for stable attribution.
//!
//! # Platform Behavior
//!
//! - **Linux**: `sched_getaffinity` / `sched_getcpu` / `sched_setaffinity`.
//! - **Elsewhere**: resolution fails with [`AffinityError::Unsupported`] and the
//!   sampler records nothing. Tests inject their own [`CpuLocator`].

use std::fmt;

/// Error returned when a thread's CPU cannot be determined or set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffinityError {
    /// Affinity queries are not available on this platform.
    Unsupported,
    /// A system call failed.
    Os(String),
    /// The CPU number is outside the affinity mask range.
    InvalidCpu(usize),
}

impl fmt::Display for AffinityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffinityError::Unsupported => write!(f, "CPU affinity not supported on this platform"),
            AffinityError::Os(msg) => write!(f, "{}", msg),
            AffinityError::InvalidCpu(cpu) => write!(f, "cpu {} out of range", cpu),
        }
    }
}

impl std::error::Error for AffinityError {}

/// Source of the OS CPU number for a team member.
///
/// `member` is the member's index in its team, for locators that assign
/// CPUs by position. The OS locator ignores it and asks about the calling
/// thread.
pub trait CpuLocator: Send + Sync {
    /// OS CPU number the calling thread is bound to.
    fn current_cpu(&self, member: usize) -> Result<usize, AffinityError>;
}

impl<F> CpuLocator for F
where
    F: Fn(usize) -> Result<usize, AffinityError> + Send + Sync,
{
    fn current_cpu(&self, member: usize) -> Result<usize, AffinityError> {
        self(member)
    }
}

/// Locator backed by the calling thread's OS affinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsAffinity;

impl CpuLocator for OsAffinity {
    fn current_cpu(&self, _member: usize) -> Result<usize, AffinityError> {
        match single_bound_cpu() {
            Ok(Some(cpu)) => return Ok(cpu),
            Ok(None) => {}
            Err(e) => tracing::debug!("Affinity mask unavailable: {}", e),
        }
        running_cpu()
    }
}

/// The CPU the calling thread is bound to, if its mask holds exactly one.
#[cfg(target_os = "linux")]
pub fn single_bound_cpu() -> Result<Option<usize>, AffinityError> {
    use std::mem::MaybeUninit;

    // SAFETY: the mask is fully written by a successful sched_getaffinity
    // before it is read.
    unsafe {
        let mut mask = MaybeUninit::<libc::cpu_set_t>::zeroed();
        let result = libc::sched_getaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            mask.as_mut_ptr(),
        );
        if result != 0 {
            return Err(AffinityError::Os(format!(
                "sched_getaffinity failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let mask = mask.assume_init();
        if libc::CPU_COUNT(&mask) != 1 {
            return Ok(None);
        }
        Ok((0..libc::CPU_SETSIZE as usize).find(|cpu| libc::CPU_ISSET(*cpu, &mask)))
    }
}

/// The CPU the calling thread is bound to, if its mask holds exactly one.
#[cfg(not(target_os = "linux"))]
pub fn single_bound_cpu() -> Result<Option<usize>, AffinityError> {
    Err(AffinityError::Unsupported)
}

/// The CPU the calling thread is running on.
#[cfg(target_os = "linux")]
pub fn running_cpu() -> Result<usize, AffinityError> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        return Err(AffinityError::Os(format!(
            "sched_getcpu failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(cpu as usize)
}

/// The CPU the calling thread is running on.
#[cfg(not(target_os = "linux"))]
pub fn running_cpu() -> Result<usize, AffinityError> {
    Err(AffinityError::Unsupported)
}

/// RAII guard pinning the calling thread to one CPU.
///
/// The original affinity mask is restored on drop.
pub struct AffinityGuard {
    #[cfg(target_os = "linux")]
    original_mask: libc::cpu_set_t,
    cpu: usize,
}

impl AffinityGuard {
    /// Pin the calling thread to `cpu`.
    #[cfg(target_os = "linux")]
    pub fn pin(cpu: usize) -> Result<Self, AffinityError> {
        use std::mem::MaybeUninit;

        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(AffinityError::InvalidCpu(cpu));
        }

        // SAFETY: both masks are initialized before use; the original mask is
        // fully written by a successful sched_getaffinity.
        unsafe {
            let mut original_mask = MaybeUninit::<libc::cpu_set_t>::zeroed();
            let result = libc::sched_getaffinity(
                0,
                std::mem::size_of::<libc::cpu_set_t>(),
                original_mask.as_mut_ptr(),
            );
            if result != 0 {
                return Err(AffinityError::Os(format!(
                    "sched_getaffinity failed: {}",
                    std::io::Error::last_os_error()
                )));
            }
            let original_mask = original_mask.assume_init();

            let mut new_mask: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut new_mask);
            libc::CPU_SET(cpu, &mut new_mask);

            let result =
                libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &new_mask);
            if result != 0 {
                return Err(AffinityError::Os(format!(
                    "sched_setaffinity failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            tracing::debug!("Pinned thread to CPU {}", cpu);
            Ok(AffinityGuard { original_mask, cpu })
        }
    }

    /// Pin the calling thread to `cpu`.
    #[cfg(not(target_os = "linux"))]
    pub fn pin(_cpu: usize) -> Result<Self, AffinityError> {
        Err(AffinityError::Unsupported)
    }

    /// Pin the calling thread to the CPU it is running on.
    pub fn pin_current() -> Result<Self, AffinityError> {
        Self::pin(running_cpu()?)
    }

    /// The CPU the thread is pinned to.
    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

impl fmt::Debug for AffinityGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityGuard").field("cpu", &self.cpu).finish()
    }
}

#[cfg(target_os = "linux")]
impl Drop for AffinityGuard {
    fn drop(&mut self) {
        // SAFETY: restoring a mask previously returned by sched_getaffinity.
        let result = unsafe {
            libc::sched_setaffinity(
                0,
                std::mem::size_of::<libc::cpu_set_t>(),
                &self.original_mask,
            )
        };
        if result != 0 {
            tracing::warn!(
                "Failed to restore CPU affinity: {}",
                std::io::Error::last_os_error()
            );
        } else {
            tracing::debug!("Restored original CPU affinity");
        }
    }
}
