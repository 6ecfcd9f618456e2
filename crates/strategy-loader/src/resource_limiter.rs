//! Resource bounding for sandboxed strategy execution, grounded on
//! `resource_limiter.py`: a CPU-time/address-space rlimit applied to the
//! current process plus a wall-clock deadline enforced the same way
//! `parallel-exec`'s `run_with_timeout` does, since POSIX rlimits alone
//! don't bound wall time when a strategy blocks without burning CPU.

use std::sync::mpsc;
use std::time::Duration;

use crate::error::LoaderError;

#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub cpu_seconds: u64,
    pub address_space_bytes: u64,
    pub wall_clock: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_seconds: 5,
            address_space_bytes: 512 * 1024 * 1024,
            wall_clock: Duration::from_secs(10),
        }
    }
}

/// Applies `RLIMIT_CPU` (and, off Darwin, `RLIMIT_AS`) to the calling
/// thread's process. Mirrors `resource.setrlimit` in the original
/// sanitizer — rlimits are process-wide in POSIX, so this should only be
/// called from a disposable worker process or thread intended to die
/// with the strategy it bounds.
pub fn apply_rlimits(limits: &ResourceLimits) -> Result<(), LoaderError> {
    unsafe {
        let cpu_limit = libc::rlimit {
            rlim_cur: limits.cpu_seconds as libc::rlim_t,
            rlim_max: limits.cpu_seconds as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &cpu_limit) != 0 {
            return Err(LoaderError::ResourceExhausted(
                "failed to set RLIMIT_CPU".to_string(),
            ));
        }

        #[cfg(not(target_os = "macos"))]
        {
            let as_limit = libc::rlimit {
                rlim_cur: limits.address_space_bytes as libc::rlim_t,
                rlim_max: limits.address_space_bytes as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &as_limit) != 0 {
                return Err(LoaderError::ResourceExhausted(
                    "failed to set RLIMIT_AS".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Runs `f` on a scoped thread and enforces `limits.wall_clock` as a
/// hard deadline; a timed-out call leaves its worker thread detached
/// (it will still be bound by the process-wide rlimits applied by the
/// caller before spawning) rather than blocking the caller forever.
pub fn run_with_deadline<T, F>(limits: &ResourceLimits, f: F) -> Result<T, LoaderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LoaderError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(limits.wall_clock) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(LoaderError::ResourceExhausted(format!(
            "wall clock budget of {:?} exceeded",
            limits.wall_clock
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(LoaderError::ResourceExhausted(
            "strategy worker thread panicked".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_within_deadline() {
        let limits = ResourceLimits {
            wall_clock: Duration::from_millis(200),
            ..Default::default()
        };
        let result = run_with_deadline(&limits, || Ok::<_, LoaderError>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn exceeding_deadline_is_resource_exhausted() {
        let limits = ResourceLimits {
            wall_clock: Duration::from_millis(50),
            ..Default::default()
        };
        let result = run_with_deadline(&limits, || {
            std::thread::sleep(Duration::from_millis(500));
            Ok::<_, LoaderError>(1)
        });
        assert!(matches!(result, Err(LoaderError::ResourceExhausted(_))));
    }

    #[test]
    fn propagates_inner_error() {
        let limits = ResourceLimits::default();
        let result: Result<i32, LoaderError> =
            run_with_deadline(&limits, || Err(LoaderError::SandboxFailure("boom".to_string())));
        assert!(matches!(result, Err(LoaderError::SandboxFailure(_))));
    }
}
