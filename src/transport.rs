//! Unix socket transport.
//!
//! The daemon listens on a Unix domain socket, usually in the abstract
//! namespace on production devices and at a filesystem path in test rigs.
//! [`SocketName`] names either form; [`SocketName::connect`] produces a
//! ready [`UnixStream`].

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;

/// Address of the daemon's listening socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketName {
    /// Filesystem path, e.g. `/dev/socket/rild`.
    Path(PathBuf),
    /// Abstract namespace name (no leading NUL; it is added internally).
    Abstract(String),
}

impl std::fmt::Display for SocketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketName::Path(p) => write!(f, "{}", p.display()),
            SocketName::Abstract(name) => write!(f, "@{}", name),
        }
    }
}

impl SocketName {
    /// Connects to the socket this name designates.
    pub async fn connect(&self) -> io::Result<UnixStream> {
        match self {
            SocketName::Path(path) => UnixStream::connect(path).await,
            SocketName::Abstract(name) => connect_abstract(name).await,
        }
    }
}

#[cfg(target_os = "linux")]
async fn connect_abstract(name: &str) -> io::Result<UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixStream as StdUnixStream};

    let name = name.to_owned();
    // Abstract-namespace connect has no async form in tokio; do the
    // blocking connect off-runtime and convert the resulting fd.
    let stream = tokio::task::spawn_blocking(move || -> io::Result<StdUnixStream> {
        let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
        let stream = StdUnixStream::connect_addr(&addr)?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

    UnixStream::from_std(stream)
}

#[cfg(not(target_os = "linux"))]
async fn connect_abstract(_name: &str) -> io::Result<UnixStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract socket namespace requires Linux",
    ))
}

/// Generates a unique filesystem socket path for tests and demos.
pub fn ephemeral_socket_path() -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "radiowire-{}-{:08x}-{}.sock",
        process::id(),
        nanos,
        seq
    ));
    path
}
