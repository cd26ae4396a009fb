//! Deployment engine: workspaces, git sync, and process supervision

pub mod git;
pub mod nodejs;
pub mod orchestrator;
pub mod pm2;
pub mod request;
pub mod validate;
pub mod workspace;

pub use orchestrator::{DeployFailure, Orchestrator};
pub use request::{AppReference, CommandsRequest, CreateApplicationRequest, DeployOptions};
