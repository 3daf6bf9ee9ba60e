//! Recursive mutex + condvar hybrid, and counting semaphores (named and
//! unnamed).

pub mod mutex;
pub mod semaphore;

pub use mutex::Mutex;
pub use semaphore::{open_named as semaphore_open_named, unlink_named as semaphore_unlink_named, Semaphore};
