//! Privilege precondition for execute mode.

/// Message printed when execute mode is refused.
pub const NOT_ROOT_MESSAGE: &str = "You need to be root to run this, sorry";

/// Returns true if the process runs with effective uid 0.
#[must_use]
#[allow(unsafe_code)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
