//! In-process QUsb2Snes stand-in used by the unit tests.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message as WsMessage};

use crate::protocol::messages::{Opcode, Request};
use crate::{WRAM_BASE_ADDRESS, WRAM_SIZE};

/// What the fake server reports and how it behaves.
#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    pub devices: Vec<String>,
    /// `Info` version; empty simulates an attach that did not take.
    pub version: String,
    pub rom: String,
    pub memory: Vec<u8>,
    /// `false` leaves every `GetAddress` unanswered.
    pub answer_reads: bool,
    /// Splits binary replies into frames of this many bytes.
    pub chunk_size: Option<usize>,
}

impl FakeDevice {
    pub fn with_devices(devices: &[&str]) -> Self {
        Self {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            version: "1.11.0-usb-v2".to_string(),
            rom: "/sm.sfc".to_string(),
            memory: vec![0; WRAM_SIZE as usize],
            answer_reads: true,
            chunk_size: None,
        }
    }
}

pub(crate) struct FakeServer {
    pub url: String,
    pub device: Arc<Mutex<FakeDevice>>,
    requests: Arc<Mutex<Vec<Request>>>,
    connections: Arc<Mutex<Vec<JoinHandle<()>>>>,
    acceptor: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(device: FakeDevice) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let device = Arc::new(Mutex::new(device));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let acceptor = {
            let device = device.clone();
            let requests = requests.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let handle = tokio::spawn(serve(stream, device.clone(), requests.clone()));
                    connections.lock().unwrap().push(handle);
                }
            })
        };

        Self {
            url,
            device,
            requests,
            connections,
            acceptor,
        }
    }

    /// Every request received so far, across all connections.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        self.requests().iter().map(|r| r.opcode).collect()
    }

    pub fn set_memory(&self, offset: usize, bytes: &[u8]) {
        self.device.lock().unwrap().memory[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Drops every open connection while still accepting new ones.
    pub fn kill_connections(&self) {
        for handle in self.connections.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.acceptor.abort();
        self.kill_connections();
    }
}

async fn serve(
    stream: TcpStream,
    device: Arc<Mutex<FakeDevice>>,
    requests: Arc<Mutex<Vec<Request>>>,
) {
    let Ok(mut ws_stream) = accept_async(stream).await else {
        return;
    };

    while let Some(Ok(frame)) = ws_stream.next().await {
        let WsMessage::Text(text) = frame else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Request>(text.as_str()) else {
            continue;
        };
        requests.lock().unwrap().push(request.clone());

        let replies = answer(&request, &device.lock().unwrap());
        for reply in replies {
            if ws_stream.send(reply).await.is_err() {
                return;
            }
        }
    }
}

fn answer(request: &Request, device: &FakeDevice) -> Vec<WsMessage> {
    let results = |list: Vec<String>| {
        let body = serde_json::json!({ "Results": list }).to_string();
        vec![WsMessage::Text(body.into())]
    };

    match request.opcode {
        Opcode::DeviceList => results(device.devices.clone()),
        Opcode::Info => results(vec![
            device.version.clone(),
            "SD2SNES".to_string(),
            device.rom.clone(),
            "NO_CONTROL_CMD".to_string(),
        ]),
        Opcode::GetAddress if device.answer_reads => {
            let address = u32::from_str_radix(&request.operands[0], 16).unwrap();
            let size = usize::from_str_radix(&request.operands[1], 16).unwrap();
            let start = (address - WRAM_BASE_ADDRESS) as usize;
            let data = device.memory[start..start + size].to_vec();
            let chunk = device.chunk_size.unwrap_or(data.len().max(1));
            data.chunks(chunk)
                .map(|c| WsMessage::Binary(c.to_vec().into()))
                .collect()
        }
        _ => Vec::new(),
    }
}
