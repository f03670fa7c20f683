//! The capability every instrumentation strategy provides.

use std::sync::Arc;

use stackcast_common::SourceKind;

use crate::domain::ProfilerError;
use crate::stats::RootStats;

/// Something that observes the running program and writes call paths into
/// a [`RootStats`] between `start` and `stop`.
///
/// The measurement cycle only ever drives a source through this trait; it
/// never needs to know which strategy is behind it.
pub trait InstrumentationSource: Send {
    fn kind(&self) -> SourceKind;

    /// Begin feeding `stats`.
    ///
    /// # Errors
    /// [`ProfilerError::AlreadyActive`] if another source holds the process
    /// slot, [`ProfilerError::AlreadyRunning`] if this source is started.
    fn start(&mut self, stats: Arc<RootStats>) -> Result<(), ProfilerError>;

    /// Stop feeding. No writes happen after this returns.
    ///
    /// # Errors
    /// [`ProfilerError::NotRunning`] if the source was not started.
    fn stop(&mut self) -> Result<(), ProfilerError>;

    fn is_running(&self) -> bool;
}

impl<S: InstrumentationSource + ?Sized> InstrumentationSource for Box<S> {
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn start(&mut self, stats: Arc<RootStats>) -> Result<(), ProfilerError> {
        (**self).start(stats)
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}
