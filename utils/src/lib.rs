//! Leverage common synchronization functionality across sluice primitives.
//!
//! Every blocking operation in sluice is bounded: it accepts a [std::time::Duration] and
//! returns a definite success or failure. [Duration::ZERO](std::time::Duration::ZERO) always
//! means "do not block".

use std::any::Any;

mod deadline;
pub use deadline::Deadline;
mod semaphore;
pub use semaphore::Semaphore;

/// Extract a human-readable message from a panic payload.
pub fn extract_panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{err:?}")
    }
}
