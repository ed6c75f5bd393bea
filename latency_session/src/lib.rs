pub mod config;
pub mod event;
pub mod parser;
pub mod recorder;
pub mod runner;

pub use config::{EngineConfig, ReaperConfig};
pub use event::RequestEvent;
pub use parser::{parse_config_from_file, parse_config_from_str, parse_trace_from_file, parse_trace_from_str};
pub use recorder::{EventOutcome, Notification, ProfileLogs, Recorder, ReaperHandle};
pub use runner::{ReplayReport, ReplayRunner};
