use crate::error::supervisor::SupervisorError;

use common::ErrorLocation;

use std::net::TcpListener;
use std::ops::Range;
use std::panic::Location;

use log::{debug, trace};

/// Dynamic/private port range (RFC 6335). The end is exclusive.
pub const EPHEMERAL_PORT_RANGE: Range<u16> = 49152..65535;

/// Find the first port in `range` that can be bound on `hostname`.
///
/// The probe listener is closed again before returning, so the port is only
/// likely, not guaranteed, to still be free when the server binds it.
///
/// # Errors
///
/// Returns [`SupervisorError::PortExhausted`] if every port in the range is taken.
#[track_caller]
pub fn first_available_port(hostname: &str, range: Range<u16>) -> Result<u16, SupervisorError> {
    for port in range.clone() {
        match TcpListener::bind((hostname, port)) {
            Ok(listener) => {
                drop(listener);
                debug!("Port {port} is available on {hostname}");
                return Ok(port);
            }
            Err(e) => trace!("Port {port} unavailable on {hostname}: {e}"),
        }
    }

    Err(SupervisorError::PortExhausted {
        message: format!(
            "All ports from {} to {} are in use on {hostname}. Please close a port.",
            range.start,
            range.end.saturating_sub(1)
        ),
        location: ErrorLocation::from(Location::caller()),
    })
}
