//! Error types for world construction.
//!
//! The engine distinguishes three failure categories. Programmer precondition
//! violations (attaching a component twice, accessing an absent entity,
//! undeclared capability use) are fatal and abort with a diagnostic.
//! Allocation failure is fatal. The only *recoverable* failure is a
//! configuration error during world initialization, modeled here.
//!
//! Errors are small structured values implementing [`std::error::Error`] and
//! [`fmt::Display`]; `Display` messages are single-line and suitable for
//! operator logs, `Debug` retains full structure.

use std::fmt;

/// Returned when `init` completes with unconstructed resource slots.
///
/// Carries the names of every resource that was registered with the world
/// but never constructed by the initializer. The world is not created and
/// no other side effects occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldInitError {
    /// Names of the registered resources left unconstructed.
    pub missing: Vec<&'static str>,
}

impl fmt::Display for WorldInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "world init left {} resource slot(s) unconstructed: {}",
            self.missing.len(),
            self.missing.join(", ")
        )
    }
}

impl std::error::Error for WorldInitError {}
