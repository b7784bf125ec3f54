//! Progress reporting for long-running operations.
//!
//! A trait rather than a bare closure so a caller can route progress to a
//! channel, a GUI event queue, or a log sink without the operations layer
//! knowing which.

/// Receives progress updates from `backup`/`erase`/`restore`.
pub trait ProgressSink {
    fn report(&mut self, percent: u8, message: Option<&str>);
}

/// Drops every update. The default for callers that don't care.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&mut self, _percent: u8, _message: Option<&str>) {}
}

impl<F: FnMut(u8, Option<&str>)> ProgressSink for F {
    fn report(&mut self, percent: u8, message: Option<&str>) {
        self(percent, message)
    }
}
