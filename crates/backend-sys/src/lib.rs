//! C2 `PtraceOps`: the raw syscall layer. Typed wrappers over `ptrace`,
//! `tkill`, and `waitpid`, plus the extended wait-status decoder other
//! crates build their event semantics on top of.

pub mod error;
pub mod ops;
pub mod status;

pub use error::PtraceError;
pub use ops::{TraceOption, default_attached_options, default_spawned_options};
pub use status::{ExtendedEvent, RawStatus};
