//! Photo session sequencing: states, per-guest context and the tick-driven machine.

pub mod context;
pub mod machine;
pub mod state;

pub use context::{SessionContext, TextSelection};
pub use machine::{MachineParts, SessionMachine};
pub use state::{SessionEvent, SessionState, SessionStateChange, Shot};
