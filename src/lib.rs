// Library surface: the scan engine plus the pieces the console binary and
// integration tests share. Terminal rendering stays in the binary.
pub mod app_dirs;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod field;
pub mod governor;
pub mod history;
pub mod ingest;
pub mod runtime;
pub mod session;
pub mod simulate;
pub mod timer;
pub mod transport;

pub use config::ScanConfig;
pub use dispatch::{Callbacks, Scan, ScanSink};
pub use engine::{Outcome, ScanEngine};
pub use ingest::{EventTarget, HostInput, Key, KeyInput, ValueChange};
