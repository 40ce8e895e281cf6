//! Operator cancellation wiring for in-flight engine operations.
//!
//! A [`SignalScope`] is installed immediately before an engine operation
//! starts and torn down when it settles, so handler registrations never
//! accumulate across sequential operations. Repeated signals during one
//! operation collapse into a single latched request; [`CancelDispatch`]
//! turns that request into at most one engine cancel call.

use crate::error::EngineError;

/// Source of operator cancellation requests, polled between output reads
/// while an engine operation is in flight.
pub trait CancelSource {
    /// Whether cancellation has been requested. Latched: once true, stays
    /// true for the lifetime of the source.
    fn cancel_requested(&mut self) -> bool;
}

/// A source that never requests cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl CancelSource for NeverCancelled {
    fn cancel_requested(&mut self) -> bool {
        false
    }
}

/// Collapses repeated cancellation requests into a single cancel issuance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelDispatch {
    issued: bool,
}

impl CancelDispatch {
    /// Whether a cancel should be issued now. True exactly once, on the
    /// first polled request.
    pub fn should_issue(&mut self, requested: bool) -> bool {
        if requested && !self.issued {
            self.issued = true;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub const fn issued(&self) -> bool {
        self.issued
    }
}

#[cfg(target_os = "linux")]
pub use linux::SignalScope;

#[cfg(target_os = "linux")]
mod linux {
    use nix::sys::signal::{SigSet, Signal, SigmaskHow, sigprocmask};
    use nix::sys::signalfd::{SfdFlags, SignalFd};

    use super::CancelSource;
    use crate::error::EngineError;

    /// Blocks SIGINT/SIGTERM for the scope's lifetime and surfaces them as
    /// latched cancellation requests via a non-blocking signalfd. Dropping
    /// the scope restores the previous signal mask.
    pub struct SignalScope {
        fd: SignalFd,
        previous_mask: SigSet,
        latched: bool,
    }

    impl SignalScope {
        /// Install the scope.
        ///
        /// # Errors
        ///
        /// Returns an error when the signal mask or signalfd cannot be set
        /// up.
        pub fn install() -> Result<Self, EngineError> {
            let mut mask = SigSet::empty();
            mask.add(Signal::SIGINT);
            mask.add(Signal::SIGTERM);

            let mut previous_mask = SigSet::empty();
            sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), Some(&mut previous_mask)).map_err(
                |errno| EngineError::Signal {
                    message: format!("failed to block signals: {errno}"),
                },
            )?;

            match SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC) {
                Ok(fd) => Ok(Self {
                    fd,
                    previous_mask,
                    latched: false,
                }),
                Err(errno) => {
                    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous_mask), None);
                    Err(EngineError::Signal {
                        message: format!("failed to create signalfd: {errno}"),
                    })
                }
            }
        }
    }

    impl CancelSource for SignalScope {
        fn cancel_requested(&mut self) -> bool {
            if self.latched {
                return true;
            }
            while let Ok(Some(_)) = self.fd.read_signal() {
                self.latched = true;
            }
            self.latched
        }
    }

    impl Drop for SignalScope {
        fn drop(&mut self) {
            let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous_mask), None);
        }
    }
}

/// Install the platform cancellation scope for one operation.
///
/// # Errors
///
/// Returns an error when signal wiring cannot be set up.
#[cfg(target_os = "linux")]
pub fn install_signal_scope() -> Result<impl CancelSource, EngineError> {
    SignalScope::install()
}

#[cfg(not(target_os = "linux"))]
pub fn install_signal_scope() -> Result<impl CancelSource, EngineError> {
    Ok(NeverCancelled)
}

#[cfg(test)]
mod tests {
    use super::CancelDispatch;

    #[test]
    fn repeated_requests_issue_exactly_one_cancel() {
        let mut dispatch = CancelDispatch::default();
        assert!(!dispatch.should_issue(false));
        assert!(dispatch.should_issue(true));
        assert!(!dispatch.should_issue(true));
        assert!(!dispatch.should_issue(true));
        assert!(dispatch.issued());
    }

    #[test]
    fn no_request_never_issues() {
        let mut dispatch = CancelDispatch::default();
        assert!(!dispatch.should_issue(false));
        assert!(!dispatch.should_issue(false));
        assert!(!dispatch.issued());
    }
}
