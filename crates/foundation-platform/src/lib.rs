//! The OS-facing layer: a multi-source wait primitive, a thread wrapper
//! with cooperative cancellation, the process `initialize -> run ->
//! finalize` skeleton with crash trapping, a thin dynamic-library loader,
//! and the process-wide [`Config`].
//!
//! `foundation-core` and `foundation-alloc` are portable (no direct OS
//! calls beyond what `std` already abstracts); everything that genuinely
//! needs the platform — epoll/eventfd-style multiplexed waiting, signal
//! handling, `dlopen` — lives here.

pub mod beacon;
pub mod config;
pub mod library;
pub mod process;
pub mod thread;

pub use beacon::Beacon;
pub use config::{Config, ConfigBuilder, ConfigError};
pub use library::{Library, LibraryError};
pub use process::{ExitCode, ProcessError};
pub use thread::{JoinHandleError, Thread, ThreadHandle};
