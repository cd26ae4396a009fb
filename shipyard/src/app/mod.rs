//! Process-level wiring

pub mod run;
pub mod state;
