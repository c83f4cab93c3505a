//! Private socket addressing for shim RPC channels
//!
//! Addresses are a pure function of (namespace, id) and are bound in the
//! abstract socket namespace, so no filesystem entry exists to clean up or
//! collide with. The platform caps the encoded address at 106 bytes;
//! anything longer fails fast instead of truncating.

use keel_foundation::{Context, Error, Result};
use std::time::Duration;
use tracing::trace;

/// Conventional prefix for all shim socket addresses
const SOCKET_ROOT: &str = "/keel-shim";

/// Platform limit on the encoded socket address
const MAX_ADDRESS_LEN: usize = 106;

/// Compute the private RPC address for a task's shim
///
/// Total and side-effect-free: `/keel-shim/<namespace>/<id>/shim.sock`.
pub fn shim_socket_address(ctx: &Context, id: &str) -> Result<String> {
    let ns = ctx.namespace_required()?;
    let address = format!("{}/{}/{}/shim.sock", SOCKET_ROOT, ns, id);
    if address.len() > MAX_ADDRESS_LEN {
        return Err(Error::Launch(format!(
            "socket address {:?} is {} bytes, exceeding the {}-byte limit",
            address,
            address.len(),
            MAX_ADDRESS_LEN
        )));
    }
    Ok(address)
}

/// Bind a listening socket at an abstract address
///
/// The returned listener's descriptor is handed to the shim at spawn; the
/// caller's copy is closed right after. Binding before the spawn is what
/// rules out a listen/connect race.
pub fn bind_abstract(address: &str) -> Result<std::os::unix::net::UnixListener> {
    use std::os::linux::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(address.as_bytes())
        .map_err(|e| Error::Launch(format!("invalid abstract address {:?}: {}", address, e)))?;
    std::os::unix::net::UnixListener::bind_addr(&addr).map_err(|e| {
        Error::Launch(format!(
            "failed to listen on abstract socket {:?}: {}",
            address, e
        ))
    })
}

/// Dial an abstract address with a bounded timeout
pub async fn connect_abstract(address: &str, timeout: Duration) -> Result<tokio::net::UnixStream> {
    let name = address.to_string();
    let connect = tokio::task::spawn_blocking(move || {
        use std::os::linux::net::SocketAddrExt;

        let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
        let stream = std::os::unix::net::UnixStream::connect_addr(&addr)?;
        stream.set_nonblocking(true)?;
        Ok::<_, std::io::Error>(stream)
    });

    let stream = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| Error::transport(format!("dial {:?} timed out", address)))?
        .map_err(|e| Error::transport(format!("dial {:?} aborted: {}", address, e)))?
        .map_err(|e| Error::transport(format!("failed to dial {:?}: {}", address, e)))?;

    trace!(address, "shim socket connected");
    tokio::net::UnixStream::from_std(stream).map_err(|e| Error::transport(e.to_string()))
}
