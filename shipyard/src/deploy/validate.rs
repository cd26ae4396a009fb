//! Input checks run before anything is persisted

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, TcpListener};

use crate::errors::ShipyardError;

/// Stack type handled by the Node.js step
pub const NODEJS: &str = "nodejs";

/// Lowest port an application may bind
pub const MIN_PORT: u16 = 1024;

const NODE_PACKAGE_MANAGERS: [&str; 3] = ["npm", "yarn", "pnpm"];

/// Start command used when a request leaves it out
pub fn default_start_command(stack_type: &str) -> Option<&'static str> {
    match stack_type {
        NODEJS => Some("npm start"),
        _ => None,
    }
}

/// Port must be unprivileged and currently free on all interfaces
pub fn validate_port(port: u16) -> Result<(), ShipyardError> {
    if port < MIN_PORT {
        return Err(ShipyardError::Validation(format!(
            "port {} is outside the allowed range {}-{}",
            port,
            MIN_PORT,
            u16::MAX
        )));
    }

    let conflict =
        |e: std::io::Error| ShipyardError::ResourceConflict(format!("port {} is not available: {}", port, e));

    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .map(drop)
        .map_err(conflict)?;

    // Hosts without IPv6 fail this bind with something other than AddrInUse
    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => Err(conflict(e)),
        Err(_) => Ok(()),
    }
}

/// Reject start commands the supervisor cannot launch safely
pub fn validate_start_command(stack_type: &str, command: &str) -> Result<(), ShipyardError> {
    if command.trim().is_empty() {
        return Err(ShipyardError::Validation("start command is empty".into()));
    }

    match stack_type {
        NODEJS => validate_node_start(command),
        _ => Ok(()),
    }
}

/// `<pm> start` or `<pm> run <script>`
fn validate_node_start(command: &str) -> Result<(), ShipyardError> {
    let invalid = || {
        ShipyardError::Validation(format!(
            "invalid start command {:?}: expected `npm|yarn|pnpm start` or `npm|yarn|pnpm run <script>`",
            command
        ))
    };

    if command.contains(['&', '|', ';']) {
        return Err(invalid());
    }

    let parts: Vec<&str> = command.split_whitespace().collect();
    match parts.as_slice() {
        [pm, "start"] if NODE_PACKAGE_MANAGERS.contains(pm) => Ok(()),
        [pm, "run", script] if NODE_PACKAGE_MANAGERS.contains(pm) && is_script_name(script) => {
            Ok(())
        }
        _ => Err(invalid()),
    }
}

fn is_script_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'))
}
