//! # USB2SNES WebSocket Client
//!
//! A strictly request/reply client over one persistent WebSocket session.
//!
//! ## Key Design Principles:
//! - **One Outstanding Request**: the session lives behind an async mutex and a
//!   request holds it from `send` until its reply (or timeout) resolves. A reply
//!   can therefore never be consumed by the wrong caller.
//! - **Bounded Waits**: every wait carries a deadline. Memory reads get a short
//!   budget, control replies (`DeviceList`, `Info`) a longer one. A dead or
//!   closed socket fails immediately instead of hanging.
//! - **First Event Wins**: whichever arrives first of reply, error, close or
//!   deadline resolves the wait. Nothing is left registered afterwards because
//!   the wait is a plain future that simply completes.
//! - **Resynchronization by Reconnect**: a reply that misses its deadline may
//!   still arrive later and would answer the next request. The client drops the
//!   session instead, so the next `connect()` starts from a clean stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::error::AutosplitError;
use crate::protocol::messages::{DeviceInfo, Opcode, Reply, ReplyBody, Request};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default QUsb2Snes endpoint.
pub const DEFAULT_URL: &str = "ws://localhost:8080";

/// Time budgets for reply waits.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    /// Budget for `DeviceList`, `Info` and the opening handshake.
    pub reply: Duration,
    /// Budget for a `GetAddress` binary reply.
    pub address: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            reply: Duration::from_millis(2000),
            address: Duration::from_millis(100),
        }
    }
}

pub struct Usb2SnesClient {
    url: String,
    timeouts: ClientTimeouts,
    session: Mutex<Option<WsStream>>,
    alive: AtomicBool,
}

impl Usb2SnesClient {
    /// Creates a client for `url`; no connection is made until `connect()`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeouts(url, ClientTimeouts::default())
    }

    pub fn with_timeouts(url: impl Into<String>, timeouts: ClientTimeouts) -> Self {
        Self {
            url: url.into(),
            timeouts,
            session: Mutex::new(None),
            alive: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Opens the socket. Returns `true` iff it reached the open state before an
    /// error, a close, or the reply deadline. An already open socket is reused.
    pub async fn connect(&self) -> bool {
        let mut session = self.session.lock().await;
        if session.is_some() && self.alive.load(Ordering::Acquire) {
            return true;
        }
        *session = None;

        log::debug!("Connecting to USB2SNES server: {}", self.url);
        match timeout(self.timeouts.reply, connect_async(self.url.as_str())).await {
            Ok(Ok((ws_stream, _))) => {
                *session = Some(ws_stream);
                self.alive.store(true, Ordering::Release);
                log::info!("Connected to USB2SNES server at {}", self.url);
                true
            }
            Ok(Err(e)) => {
                log::warn!("Failed to connect to {}: {}", self.url, e);
                false
            }
            Err(_) => {
                log::warn!(
                    "Connecting to {} timed out after {}ms",
                    self.url,
                    self.timeouts.reply.as_millis()
                );
                false
            }
        }
    }

    /// Live socket state.
    pub fn connected(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Closes the socket. Safe to call any number of times.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        self.alive.store(false, Ordering::Release);
        if let Some(mut ws_stream) = session.take() {
            if let Err(e) = ws_stream.close(None).await {
                log::debug!("Close handshake failed: {}", e);
            }
            log::info!("Disconnected from {}", self.url);
        }
    }

    /// Fire-and-forget command.
    pub async fn send(&self, opcode: Opcode, operands: Vec<String>) -> Result<(), AutosplitError> {
        let mut session = self.session.lock().await;
        self.send_locked(&mut session, &Request::new(opcode, operands))
            .await
    }

    /// Waits for the next reply frame. `opcode` only labels errors.
    pub async fn await_reply(
        &self,
        opcode: Opcode,
        wait: Duration,
    ) -> Result<Reply, AutosplitError> {
        let mut session = self.session.lock().await;
        self.wait_locked(&mut session, opcode, wait, None).await
    }

    /// Sends `request` and waits for its reply while holding the session.
    async fn request(&self, request: Request, wait: Duration) -> Result<Reply, AutosplitError> {
        let mut session = self.session.lock().await;
        self.send_locked(&mut session, &request).await?;
        self.wait_locked(&mut session, request.opcode, wait, None)
            .await
    }

    /// Sends a command that must be answered with a `Results` list.
    async fn request_results(
        &self,
        opcode: Opcode,
        operands: Vec<String>,
    ) -> Result<Vec<String>, AutosplitError> {
        match self
            .request(Request::new(opcode, operands), self.timeouts.reply)
            .await?
        {
            Reply::Results(results) => Ok(results),
            Reply::Binary(data) => Err(AutosplitError::MalformedReply {
                opcode: opcode.to_string(),
                detail: format!("unexpected binary frame of {} bytes", data.len()),
            }),
        }
    }

    /// Names of the devices the server can attach to.
    pub async fn device_list(&self) -> Result<Vec<String>, AutosplitError> {
        self.request_results(Opcode::DeviceList, Vec::new()).await
    }

    /// Queries the attached device. An empty `version` means nothing is attached.
    pub async fn info(&self) -> Result<DeviceInfo, AutosplitError> {
        let results = self.request_results(Opcode::Info, Vec::new()).await?;
        Ok(DeviceInfo::from_results(&results))
    }

    pub async fn attach(&self, device: &str) -> Result<(), AutosplitError> {
        self.send(Opcode::Attach, vec![device.to_string()]).await
    }

    pub async fn set_name(&self, name: &str) -> Result<(), AutosplitError> {
        self.send(Opcode::Name, vec![name.to_string()]).await
    }

    /// Resets the console.
    pub async fn reset(&self) -> Result<(), AutosplitError> {
        self.send(Opcode::Reset, Vec::new()).await
    }

    /// Reads `size` bytes at the absolute console `address`.
    ///
    /// Returns an empty buffer when the read fails for any reason (timeout,
    /// text frame instead of binary, dead socket). The caller decides what a
    /// failed or short read means.
    pub async fn get_address(&self, address: u32, size: u32) -> Vec<u8> {
        let mut session = self.session.lock().await;
        if let Err(e) = self
            .send_locked(&mut session, &Request::get_address(address, size))
            .await
        {
            log::debug!("GetAddress ${:06X} not sent: {}", address, e);
            return Vec::new();
        }

        match self
            .wait_locked(
                &mut session,
                Opcode::GetAddress,
                self.timeouts.address,
                Some(size as usize),
            )
            .await
        {
            Ok(Reply::Binary(data)) => data,
            Ok(Reply::Results(_)) => {
                log::warn!("GetAddress ${:06X} answered with a text frame", address);
                Vec::new()
            }
            Err(e) => {
                log::debug!("GetAddress ${:06X} failed: {}", address, e);
                Vec::new()
            }
        }
    }

    async fn send_locked(
        &self,
        session: &mut Option<WsStream>,
        request: &Request,
    ) -> Result<(), AutosplitError> {
        let Some(ws_stream) = session.as_mut() else {
            return Err(AutosplitError::ConnectionFailure(
                "not connected".to_string(),
            ));
        };

        log::trace!("Sending {}", request.to_json());
        if let Err(e) = ws_stream
            .send(WsMessage::Text(request.to_json().into()))
            .await
        {
            self.drop_session(session);
            return Err(AutosplitError::ConnectionFailure(e.to_string()));
        }
        Ok(())
    }

    /// Waits for one reply. With `binary_len`, binary frames are concatenated
    /// until that many bytes arrived.
    async fn wait_locked(
        &self,
        session: &mut Option<WsStream>,
        opcode: Opcode,
        wait: Duration,
        binary_len: Option<usize>,
    ) -> Result<Reply, AutosplitError> {
        let Some(ws_stream) = session.as_mut() else {
            return Err(AutosplitError::ConnectionFailure(
                "not connected".to_string(),
            ));
        };

        let outcome = Self::next_reply(ws_stream, opcode, wait, binary_len).await;
        if let Err(e) = &outcome {
            if matches!(
                e,
                AutosplitError::ConnectionFailure(_) | AutosplitError::ProtocolTimeout { .. }
            ) {
                self.drop_session(session);
            }
        }
        outcome
    }

    async fn next_reply(
        ws_stream: &mut WsStream,
        opcode: Opcode,
        wait: Duration,
        binary_len: Option<usize>,
    ) -> Result<Reply, AutosplitError> {
        let deadline = Instant::now() + wait;
        let mut binary: Vec<u8> = Vec::new();

        loop {
            let frame = match timeout_at(deadline, ws_stream.next()).await {
                Err(_) => {
                    return Err(AutosplitError::ProtocolTimeout {
                        opcode: opcode.to_string(),
                        timeout_ms: wait.as_millis() as u64,
                    })
                }
                Ok(None) => {
                    return Err(AutosplitError::ConnectionFailure(
                        "stream closed by server".to_string(),
                    ))
                }
                Ok(Some(Err(e))) => return Err(AutosplitError::ConnectionFailure(e.to_string())),
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                WsMessage::Text(text) => {
                    let body: ReplyBody = serde_json::from_str(text.as_str()).map_err(|e| {
                        AutosplitError::MalformedReply {
                            opcode: opcode.to_string(),
                            detail: e.to_string(),
                        }
                    })?;
                    return Ok(Reply::Results(body.results));
                }
                WsMessage::Binary(data) => {
                    binary.extend_from_slice(&data);
                    match binary_len {
                        Some(expected) if binary.len() < expected => continue,
                        _ => return Ok(Reply::Binary(binary)),
                    }
                }
                WsMessage::Close(_) => {
                    return Err(AutosplitError::ConnectionFailure(
                        "close frame received".to_string(),
                    ))
                }
                // Ping/Pong are answered by tungstenite itself.
                _ => continue,
            }
        }
    }

    fn drop_session(&self, session: &mut Option<WsStream>) {
        if session.take().is_some() {
            log::warn!("USB2SNES session to {} dropped", self.url);
        }
        self.alive.store(false, Ordering::Release);
    }
}

#[cfg(feature = "splits")]
impl crate::splits::eval::MemoryReader for Usb2SnesClient {
    fn read_wram(
        &self,
        offset: u32,
        size: u32,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, AutosplitError>> + Send {
        async move {
            let address = crate::WRAM_BASE_ADDRESS + offset;
            let data = self.get_address(address, size).await;
            if data.is_empty() {
                Err(AutosplitError::ReadFailed { address, size })
            } else if data.len() != size as usize {
                Err(AutosplitError::ReadSizeMismatch {
                    address,
                    expected: size,
                    actual: data.len(),
                })
            } else {
                Ok(data)
            }
        }
    }
}
