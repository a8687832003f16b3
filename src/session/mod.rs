//! # Session Module
//!
//! Everything that makes up one live voice session plus the process-wide
//! registry that tracks them.
//!
//! ## Key Components:
//! - **State Machine**: The five-state lifecycle with its transition table
//! - **Session Controller**: Routes frames/events, owns cancellation
//! - **Session Registry**: Cross-session map, touched only at create/remove
//! - **Metrics Recorder**: Per-session timestamped protocol events
//!
//! ## Isolation:
//! Sessions never share mutable state with each other. The registry is the
//! single cross-session structure, and it holds only metrics handles.

pub mod controller; // Frame/event routing and the barge-in procedure
pub mod machine;    // Session state machine
pub mod metrics;    // Per-session observability events
pub mod registry;   // Process-wide session map

pub use controller::{OutboundSink, SessionController, SessionOutput, BARGE_IN_BUDGET_MS};
pub use machine::{SessionState, StateMachine};
pub use metrics::{MetricsRecorder, SessionEvent, SessionMetricsSummary};
pub use registry::SessionRegistry;
