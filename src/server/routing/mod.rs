//! Call routing: swap rules, pool allocation, attribution and the IVR flow

pub mod allocator;
pub mod context;
pub mod ivr;
pub mod phone;
pub mod resolver;
pub mod rules;
pub mod swap;
pub mod twiml;
pub mod variables;


pub use context::VisitContext;
pub use ivr::{IncomingCall, IvrEngine, IvrSettings, RecordingNotice};
pub use twiml::VoiceResponse;
