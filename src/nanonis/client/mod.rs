use super::protocol::{Command, HEADER_SIZE, Protocol, Response};
use super::transport::{self, Transport};
use crate::config::Limits;
use crate::error::NanonisError;
use crate::types::{NanonisValue, TypeTag, parse_type_codes};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub mod bias;
pub mod catalog;
pub mod folme;
pub mod piezo;
pub mod z_ctrl;

pub use catalog::{Arg, ArgSpec, CATALOG, CommandSpec, LimitKind};

/// Default port of the Nanonis TCP programming interface. The controller
/// accepts up to four clients on ports 6501 to 6504.
pub const DEFAULT_PORT: u16 = 6501;

/// Connection configuration for the Nanonis TCP client.
///
/// Contains timeout settings for different phases of the TCP connection lifecycle.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nanonis_control::ConnectionConfig;
///
/// let config = ConnectionConfig {
///     connect_timeout: Duration::from_secs(30),
///     read_timeout: Duration::from_secs(60),
///     write_timeout: Duration::from_secs(10),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the initial TCP connection
    pub connect_timeout: Duration,
    /// Timeout for reading data from the Nanonis server
    pub read_timeout: Duration,
    /// Timeout for writing data to the Nanonis server
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for constructing [`NanonisClient`] instances.
///
/// ```no_run
/// use std::time::Duration;
/// use nanonis_control::NanonisClient;
///
/// let client = NanonisClient::builder()
///     .address("192.168.1.100")
///     .port(6502)
///     .connect_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct NanonisClientBuilder {
    address: Option<String>,
    port: Option<u16>,
    config: ConnectionConfig,
    limits: Limits,
}

impl NanonisClientBuilder {
    pub fn address(mut self, addr: &str) -> Self {
        self.address = Some(addr.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the full connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Safety bounds checked by the named commands
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Connect and build the NanonisClient
    pub fn build(self) -> Result<NanonisClient, NanonisError> {
        let address = self
            .address
            .ok_or_else(|| NanonisError::InvalidCommand("Address must be specified".to_string()))?;
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let endpoint = format!("{address}:{port}");

        let socket_addr = (address.as_str(), port)
            .to_socket_addrs()
            .map_err(|_| NanonisError::InvalidAddress(endpoint.clone()))?
            .next()
            .ok_or_else(|| NanonisError::InvalidAddress(endpoint.clone()))?;

        debug!("Connecting to Nanonis at {endpoint}");

        let stream = TcpStream::connect_timeout(&socket_addr, self.config.connect_timeout)
            .map_err(|e| {
                warn!("Failed to connect to {endpoint}: {e}");
                NanonisError::Connection {
                    address: endpoint.clone(),
                    source: e,
                }
            })?;

        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.write_timeout))?;
        stream.set_nodelay(true)?;

        debug!("Successfully connected to Nanonis");

        let client = NanonisClient::with_transport(stream, self.config);
        client.set_limits(self.limits);
        Ok(client)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// A transport or framing failure happened, the stream can't be trusted
    Broken,
    Closed,
}

struct Connection<T> {
    transport: T,
    state: SessionState,
}

impl<T: Transport> Connection<T> {
    /// One request/response round trip. Must run under the session lock.
    fn exchange(&mut self, request: &[u8], command: &Command) -> Result<Response, NanonisError> {
        debug!("Sending {} bytes", request.len());
        transport::write_all(&mut self.transport, request, "command frame")?;

        let mut header = [0u8; HEADER_SIZE];
        transport::read_exact(&mut self.transport, &mut header, "response header")?;
        debug!("Response header received: {:02x?}", header);

        let body_size = Protocol::validate_response_header(&header, &command.name)?;
        debug!("Expected response body size: {}", body_size);

        let mut body = vec![0u8; body_size];
        transport::read_exact(&mut self.transport, &mut body, "response body")?;
        debug!(
            "Response body received ({} bytes): {:02x?}",
            body.len(),
            &body[..body.len().min(100)]
        );

        Protocol::parse_body(&command.name, &body, &command.return_types)
    }
}

/// Client session for the Nanonis TCP programming interface.
///
/// The protocol has no request IDs: replies are matched to requests only by
/// arrival order. Each session therefore allows a single exchange at a time.
/// `send` takes `&self` and serialises callers on an internal lock, so a
/// client can be shared between threads behind an `Arc`.
///
/// After a transport failure or a framing error the session is marked
/// broken and every later call fails with [`NanonisError::SessionBroken`];
/// open a new client to continue. Errors reported by the controller itself
/// leave the session usable.
///
/// # Examples
///
/// ```no_run
/// use nanonis_control::{NanonisClient, NanonisValue, TypeTag};
///
/// let client = NanonisClient::new("127.0.0.1", 6501)?;
///
/// client.send("Bias.Set", &[TypeTag::F32], &[NanonisValue::F32(-1.0)], &[])?;
/// let bias = client.send("Bias.Get", &[], &[], &[TypeTag::F32])?;
///
/// // Named commands accept engineering literals
/// client.call("tip_z_set", &["-100p".into()])?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct NanonisClient<T: Transport = TcpStream> {
    connection: Mutex<Connection<T>>,
    config: ConnectionConfig,
    limits: RwLock<Limits>,
}

impl<T: Transport> fmt::Debug for NanonisClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NanonisClient")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("limits", &self.limits())
            .finish_non_exhaustive()
    }
}

impl NanonisClient {
    /// Connect with default timeouts and limits.
    pub fn new(addr: &str, port: u16) -> Result<Self, NanonisError> {
        Self::builder().address(addr).port(port).build()
    }

    pub fn builder() -> NanonisClientBuilder {
        NanonisClientBuilder::default()
    }
}

impl<T: Transport> NanonisClient<T> {
    /// Wrap an already connected transport.
    pub fn with_transport(transport: T, config: ConnectionConfig) -> Self {
        Self {
            connection: Mutex::new(Connection {
                transport,
                state: SessionState::Ready,
            }),
            config,
            limits: RwLock::new(Limits::default()),
        }
    }

    /// Get the current connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn limits(&self) -> Limits {
        *self.limits.read()
    }

    pub fn set_limits(&self, limits: Limits) {
        *self.limits.write() = limits;
    }

    pub fn state(&self) -> SessionState {
        self.connection.lock().state
    }

    /// Send a command and decode its response.
    ///
    /// `arg_types` and `args` are parallel lists; `return_types` lists the
    /// values expected back, in order.
    pub fn send(
        &self,
        command: &str,
        arg_types: &[TypeTag],
        args: &[NanonisValue],
        return_types: &[TypeTag],
    ) -> Result<Vec<NanonisValue>, NanonisError> {
        let command = Command::from_parts(command, arg_types, args, return_types)?;
        self.execute(&command)
    }

    /// Like [`send`](Self::send), values first, with types in the compact
    /// notation of the Nanonis documentation (`"f"`, `"+*i"`, `"*-c"`, ...).
    pub fn quick_send(
        &self,
        command: &str,
        args: Vec<NanonisValue>,
        argument_types: &[&str],
        return_types: &[&str],
    ) -> Result<Vec<NanonisValue>, NanonisError> {
        let arg_types = parse_type_codes(argument_types)?;
        let return_types = parse_type_codes(return_types)?;
        self.send(command, &arg_types, &args, &return_types)
    }

    /// Run one command as a single atomic exchange.
    pub fn execute(&self, command: &Command) -> Result<Vec<NanonisValue>, NanonisError> {
        debug!("=== COMMAND START: {} ===", command.name);
        debug!("Arguments: {:?}", command.args);
        debug!("Return types: {:?}", command.return_types);

        // Encoding problems are caught before the wire is touched
        let request = Protocol::build_request(command)?;

        let mut connection = self.connection.lock();
        match connection.state {
            SessionState::Ready => {}
            SessionState::Broken => return Err(NanonisError::SessionBroken),
            SessionState::Closed => return Err(NanonisError::SessionClosed),
        }

        let response = match connection.exchange(&request, command) {
            Ok(response) => response,
            Err(e) => {
                if e.is_fatal() {
                    warn!("{}: {}, marking session broken", command.name, e);
                    connection.state = SessionState::Broken;
                }
                return Err(e);
            }
        };
        drop(connection);

        if let Some(fault) = &response.error {
            warn!(
                "{} rejected by server ({}): {}",
                command.name, fault.code, fault.message
            );
        } else {
            debug!("=== COMMAND SUCCESS: {} ===", command.name);
            debug!("Parsed result: {:?}", response.values);
        }
        response.into_result()
    }

    /// Release the transport. Closing an already closed session is a no-op.
    pub fn close(&self) -> Result<(), NanonisError> {
        let mut connection = self.connection.lock();
        if connection.state == SessionState::Closed {
            return Ok(());
        }
        connection.state = SessionState::Closed;
        debug!("Closing Nanonis session");
        connection.transport.close().map_err(|e| NanonisError::Io {
            source: e,
            context: "Closing connection".to_string(),
        })
    }
}

impl<T: Transport> Drop for NanonisClient<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
