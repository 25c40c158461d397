//! # Connection State Machine
//!
//! Owns the protocol-level connection state and drives the client from a bare
//! socket to an attached device.
//!
//! ## States:
//! - **`None`**: no usable session. The only state `connect()` starts from.
//! - **`Connecting`**: a connection attempt is in flight.
//! - **`Connected`**: socket open and client name set; picking and attaching a device.
//! - **`Attached`**: `Info` confirmed a firmware version. Reads may flow.
//!
//! Every failure ends in `None` and is retried on a later tick. The UI-facing
//! [`Mood`] is derived from the transitions and published on a `watch` channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::error::AutosplitError;
use crate::protocol::client::Usb2SnesClient;
use crate::protocol::messages::DeviceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    #[default]
    None,
    Connecting,
    Connected,
    Attached,
}

/// Status indicator colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mood {
    #[default]
    None,
    Error,
    Connecting,
    Ready,
}

pub struct ConnectionStateMachine {
    client: Arc<Usb2SnesClient>,
    client_name: String,
    state: Mutex<ProtocolState>,
    mood: watch::Sender<Mood>,
    last_info: Mutex<Option<DeviceInfo>>,
}

impl ConnectionStateMachine {
    pub fn new(client: Arc<Usb2SnesClient>, client_name: impl Into<String>) -> Self {
        let (mood, _) = watch::channel(Mood::None);
        Self {
            client,
            client_name: client_name.into(),
            state: Mutex::new(ProtocolState::None),
            mood,
            last_info: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<Usb2SnesClient> {
        &self.client
    }

    pub fn state(&self) -> ProtocolState {
        *lock(&self.state)
    }

    pub fn mood(&self) -> Mood {
        *self.mood.borrow()
    }

    /// Receives every mood change.
    pub fn subscribe(&self) -> watch::Receiver<Mood> {
        self.mood.subscribe()
    }

    /// `Info` of the currently attached device.
    pub fn last_info(&self) -> Option<DeviceInfo> {
        lock(&self.last_info).clone()
    }

    /// `true` iff already `Attached` with a live socket. Otherwise starts a
    /// connection attempt (dropping a dead session first) and returns `false`;
    /// the caller skips this tick either way.
    pub async fn ensure_attached(&self, device: &str) -> bool {
        match self.state() {
            ProtocolState::Attached if self.client.connected() => return true,
            ProtocolState::Attached => {
                log::warn!("USB2SNES socket is gone, reconnecting");
                self.transition(ProtocolState::None, Mood::None);
            }
            ProtocolState::Connecting | ProtocolState::Connected => return false,
            ProtocolState::None => {}
        }
        self.connect(device).await;
        false
    }

    /// Connects, names the client, and attaches to `device` (or to the last
    /// listed device when `device` is empty or absent). No-op unless the
    /// state is `None`. Returns `true` when the attempt ended `Attached`.
    pub async fn connect(&self, device: &str) -> bool {
        {
            let mut state = lock(&self.state);
            if *state != ProtocolState::None {
                return false;
            }
            *state = ProtocolState::Connecting;
        }
        log::info!("USB2SNES: None -> Connecting ({})", self.client.url());
        self.mood.send_replace(Mood::Connecting);

        if !self.client.connect().await {
            self.transition(ProtocolState::None, Mood::None);
            return false;
        }
        if let Err(e) = self.client.set_name(&self.client_name).await {
            log::warn!("Could not set client name: {}", e);
            self.transition(ProtocolState::None, Mood::None);
            return false;
        }
        self.transition(ProtocolState::Connected, Mood::Connecting);

        match self.attach(device).await {
            Ok(info) => {
                *lock(&self.last_info) = Some(info);
                self.transition(ProtocolState::Attached, Mood::Ready);
                true
            }
            Err(e) => {
                log::warn!("Attach failed: {}", e);
                let mood = if self.client.connected() {
                    Mood::Error
                } else {
                    Mood::None
                };
                self.transition(ProtocolState::None, mood);
                false
            }
        }
    }

    async fn attach(&self, device: &str) -> Result<DeviceInfo, AutosplitError> {
        let devices = self.client.device_list().await?;
        log::debug!("Devices: {:?}", devices);

        let chosen = devices
            .iter()
            .find(|d| !device.is_empty() && d.as_str() == device)
            .or_else(|| devices.last())
            .ok_or(AutosplitError::NoDevices)?;
        if !device.is_empty() && chosen != device {
            log::warn!("Device '{}' not found, using '{}'", device, chosen);
        }

        self.client.attach(chosen).await?;
        let info = self.client.info().await?;
        if !info.is_attached() {
            return Err(AutosplitError::AttachUnconfirmed(chosen.clone()));
        }
        log::info!(
            "Attached to '{}' (firmware {}, running '{}')",
            chosen,
            info.version,
            info.rom_playing
        );
        Ok(info)
    }

    /// Forces `None` and closes the socket.
    pub async fn disconnect(&self) {
        self.transition(ProtocolState::None, Mood::None);
        *lock(&self.last_info) = None;
        self.client.disconnect().await;
    }

    fn transition(&self, next: ProtocolState, mood: Mood) {
        {
            let mut state = lock(&self.state);
            if *state != next {
                log::info!("USB2SNES: {:?} -> {:?}", *state, next);
                *state = next;
            }
        }
        self.mood.send_replace(mood);
    }
}

/// Guarded values are plain data and stay valid after a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(all(test, feature = "full"))]
mod tests {
    use super::*;
    use crate::protocol::messages::Opcode;
    use crate::testing::{FakeDevice, FakeServer};

    fn machine(server: &FakeServer) -> ConnectionStateMachine {
        ConnectionStateMachine::new(Arc::new(Usb2SnesClient::new(server.url.clone())), "test")
    }

    #[tokio::test]
    async fn test_zero_devices_never_attach() {
        let server = FakeServer::start(FakeDevice::with_devices(&[])).await;
        let machine = machine(&server);

        assert!(!machine.connect("").await);
        assert_eq!(machine.state(), ProtocolState::None);
        assert_eq!(machine.mood(), Mood::Error);

        assert!(!machine.ensure_attached("").await);
        assert_eq!(machine.state(), ProtocolState::None);
        assert!(!server.opcodes().contains(&Opcode::Attach));
    }

    #[tokio::test]
    async fn test_attach_falls_back_to_last_device() {
        let server = FakeServer::start(FakeDevice::with_devices(&["first", "second"])).await;
        let machine = machine(&server);
        let mut moods = machine.subscribe();

        assert!(machine.connect("absent").await);
        assert_eq!(machine.state(), ProtocolState::Attached);
        assert_eq!(*moods.borrow_and_update(), Mood::Ready);
        assert_eq!(machine.last_info().unwrap().rom_playing, "/sm.sfc");

        let requests = server.requests();
        let attach = requests.iter().find(|r| r.opcode == Opcode::Attach).unwrap();
        assert_eq!(attach.operands, vec!["second".to_string()]);
        let name = requests.iter().find(|r| r.opcode == Opcode::Name).unwrap();
        assert_eq!(name.operands, vec!["test".to_string()]);

        // Already attached: connect() does nothing.
        let sent = server.requests().len();
        assert!(!machine.connect("first").await);
        assert!(machine.ensure_attached("first").await);
        assert_eq!(server.requests().len(), sent);
    }

    #[tokio::test]
    async fn test_empty_version_is_unconfirmed() {
        let mut device = FakeDevice::with_devices(&["sd2snes"]);
        device.version = String::new();
        let server = FakeServer::start(device).await;
        let machine = machine(&server);

        assert!(!machine.connect("sd2snes").await);
        assert_eq!(machine.state(), ProtocolState::None);
        assert_eq!(machine.mood(), Mood::Error);
        assert!(machine.last_info().is_none());
    }

    #[tokio::test]
    async fn test_dead_socket_drops_to_none_and_reconnects() {
        let server = FakeServer::start(FakeDevice::with_devices(&["sd2snes"])).await;
        let machine = machine(&server);
        assert!(machine.connect("sd2snes").await);

        machine.client().disconnect().await;
        assert!(!machine.ensure_attached("sd2snes").await);
        // The reconnect ran within the same call.
        assert_eq!(machine.state(), ProtocolState::Attached);
        assert!(machine.ensure_attached("sd2snes").await);

        machine.disconnect().await;
        assert_eq!(machine.state(), ProtocolState::None);
        assert_eq!(machine.mood(), Mood::None);
        assert!(!machine.client().connected());
    }

    #[tokio::test]
    async fn test_poisoned_state_lock_still_reconnects() {
        let server = FakeServer::start(FakeDevice::with_devices(&["sd2snes"])).await;
        let machine = machine(&server);

        std::thread::scope(|scope| {
            let poisoned = scope
                .spawn(|| {
                    let _state = machine.state.lock().unwrap();
                    panic!("poison the state lock");
                })
                .join();
            assert!(poisoned.is_err());
        });
        assert!(machine.state.is_poisoned());

        assert_eq!(machine.state(), ProtocolState::None);
        assert!(machine.connect("sd2snes").await);
        assert_eq!(machine.state(), ProtocolState::Attached);
        assert!(machine.ensure_attached("sd2snes").await);
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let machine = ConnectionStateMachine::new(
            Arc::new(Usb2SnesClient::new(format!("ws://127.0.0.1:{}", port))),
            "test",
        );
        assert!(!machine.connect("").await);
        assert_eq!(machine.state(), ProtocolState::None);
        assert_eq!(machine.mood(), Mood::None);
    }
}
