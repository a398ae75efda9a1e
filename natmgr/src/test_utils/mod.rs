//! Test utilities for exercising the event loop and cleanup protocol.
//!
//! Provides scripted stand-ins for the daemon's collaborators: an in-memory
//! event source driven by the test, a task unit that counts its invocations,
//! and recorders that capture the order in which cleanup steps ran. All of
//! them share state through cloneable handles so assertions remain possible
//! after ownership has moved into the event loop or the coordinator.
//!
//! Gated behind the `test-utils` feature so production builds never carry
//! this code.

mod recorder;
mod source;
mod unit;

pub use recorder::{RecordingFlush, RecordingNotifier, StepRecorder};
pub use source::{QueueSource, QueueSourceHandle};
pub use unit::{StubTaskUnit, StubTaskUnitHandle};
