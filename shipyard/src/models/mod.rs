//! Data models

pub mod application;
pub mod deployment;
pub mod process;

pub use application::{Application, ApplicationUpdate, Commands, NewApplication};
pub use deployment::{Deployment, DeploymentLog, DeploymentStatus, DeploymentUpdate};
pub use process::{NewProcessRegistration, ProcessRegistration};
