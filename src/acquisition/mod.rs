// Acquisition module - time-boxed sampling of the wearable sensor
//
// Components:
// 1. record: wire-format parsing of one serial line
// 2. source: SignalSource trait with serial and scripted implementations
// 3. clock: TimeSource seam for deterministic duration bounds
// 4. service: worker thread emitting ordered AcquisitionEvents

pub mod clock;
pub mod events;
pub mod record;
pub mod service;
pub mod source;

pub use clock::{StubTimeSource, SystemTimeSource, TimeSource};
pub use events::{AcquisitionEvent, LogEvent, LogKind};
pub use record::{parse_record, WireFormat};
pub use service::{progress_percent, AcquisitionRun, SignalAcquisitionService};
pub use source::{ScriptedSource, SerialPortSource, SignalSource};
