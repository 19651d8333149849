use crate::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Largest client message accepted in one receive.
pub const MAX_MESSAGE_BYTES: usize = 4096;

const ACCEPT_POLL_MS: u64 = 25;

/// Where the daemon listens for clients: a filesystem socket by default,
/// TCP when the presentation layer lives on another host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketConfig {
    Unix { path: PathBuf },
    Tcp { host: String, port: u16 },
}

/// Listening socket with bounded accept: the bridge loop must never block
/// on clients longer than one serial check interval.
pub struct CommandSocket {
    listener: Listener,
    unix_path: Option<PathBuf>,
}

enum Listener {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl CommandSocket {
    pub fn bind(config: &SocketConfig) -> Result<Self> {
        match config {
            SocketConfig::Unix { path } => Self::bind_unix(path),
            SocketConfig::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))?;
                listener.set_nonblocking(true)?;
                Ok(Self {
                    listener: Listener::Tcp(listener),
                    unix_path: None,
                })
            }
        }
    }

    #[cfg(unix)]
    fn bind_unix(path: &PathBuf) -> Result<Self> {
        // A stale socket file from a previous run blocks the bind.
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        // Clients run under the web server's account; open up the socket.
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))?;
        Ok(Self {
            listener: Listener::Unix(listener),
            unix_path: Some(path.clone()),
        })
    }

    #[cfg(not(unix))]
    fn bind_unix(_path: &PathBuf) -> Result<Self> {
        Err(Error::InvalidArgs(
            "unix sockets are not supported on this platform; use tcp".to_string(),
        ))
    }

    /// Listening TCP address, for tests and logs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(_) => None,
        }
    }

    /// Wait up to `timeout` for one client. `Ok(None)` means the window
    /// elapsed with nobody connecting.
    pub fn accept_within(&self, timeout: Duration) -> Result<Option<ClientConnection>> {
        let deadline = Instant::now() + timeout;
        loop {
            let accepted = match &self.listener {
                #[cfg(unix)]
                Listener::Unix(listener) => match listener.accept() {
                    Ok((stream, _)) => Some(ClientStream::Unix(stream)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
                    Err(e) => return Err(Error::Io(e)),
                },
                Listener::Tcp(listener) => match listener.accept() {
                    Ok((stream, _)) => Some(ClientStream::Tcp(stream)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
                    Err(e) => return Err(Error::Io(e)),
                },
            };

            if let Some(stream) = accepted {
                let mut conn = ClientConnection { stream };
                // A connected-but-silent client must not stall the loop
                // past the serial cadence either.
                conn.set_timeouts(timeout)?;
                return Ok(Some(conn));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(ACCEPT_POLL_MS));
        }
    }
}

impl Drop for CommandSocket {
    fn drop(&mut self) {
        if let Some(path) = &self.unix_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// One accepted client. The client closes the connection after reading its
/// reply; the daemon only ever handles one message per connection.
pub struct ClientConnection {
    stream: ClientStream,
}

enum ClientStream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl ClientConnection {
    fn set_timeouts(&mut self, timeout: Duration) -> Result<()> {
        let timeout = Some(timeout);
        match &self.stream {
            #[cfg(unix)]
            ClientStream::Unix(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
            }
            ClientStream::Tcp(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
            }
        }
        Ok(())
    }

    pub fn receive(&mut self) -> Result<String> {
        let mut buf = [0u8; MAX_MESSAGE_BYTES];
        let read = match &mut self.stream {
            #[cfg(unix)]
            ClientStream::Unix(stream) => stream.read(&mut buf)?,
            ClientStream::Tcp(stream) => stream.read(&mut buf)?,
        };
        Ok(String::from_utf8_lossy(&buf[..read]).trim().to_string())
    }

    pub fn send(&mut self, reply: &str) -> Result<()> {
        match &mut self.stream {
            #[cfg(unix)]
            ClientStream::Unix(stream) => stream.write_all(reply.as_bytes())?,
            ClientStream::Tcp(stream) => stream.write_all(reply.as_bytes())?,
        }
        Ok(())
    }
}
