//! Profiling core modules
//!
//! Everything that writes into the live statistics tree, and the cycle that
//! turns it into snapshots:
//! - Clock readings (process CPU, thread CPU, monotonic)
//! - The process-wide instrumentation slot
//! - The instrumentation source capability and its two strategies
//!   (tracing, sampling)
//! - The measurement cycle controller

pub mod cpu_utils;
pub mod cycle;
pub mod sampling;
pub mod slot;
pub mod source;
pub mod tracing;

// Re-export common types
pub use cpu_utils::{monotonic_now, process_cpu_now, thread_cpu_now, Timer};
pub use cycle::{CycleConfig, CycleController, CycleState};
pub use sampling::{
    ContextStack, FrameGuard, SampleTrigger, Sampler, SamplerConfig, StackProvider, StackRegistry,
};
pub use slot::{InstrumentationSlot, SlotGuard};
pub use source::InstrumentationSource;
pub use tracing::{TraceScope, Tracer, TracerConfig, TracingSource};
