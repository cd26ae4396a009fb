//! Shipyard Library
//!
//! Git-driven deployment engine: provisions application workspaces, keeps
//! them in sync with their repositories, and (re)starts them under pm2.

pub mod app;
pub mod command;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod sink;
pub mod storage;
pub mod store;
pub mod utils;
