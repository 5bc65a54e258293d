//! WebSocket UI transport (ESP-IDF only).
//!
//! ```text
//!   client ──ws frame──▶ httpd task ──▶ UiInbound ──▶ recv lane
//!   scheduler ──▶ LaneSender ──▶ send lane ──▶ ws-pump task ──▶ client
//! ```
//!
//! The scheduler never writes to the socket itself; `LaneSender` queues
//! the frame and wakes the pump task.  Every `start` spawns a new pump
//! with a fresh [`TaskNotify`], so its waiter is always the live pump.
//!
//! The same server answers `GET /control?cmd=<reset|setload|reboot>&arg=<path>`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use esp_idf_svc::http::server::ws::{EspHttpWsConnection, EspHttpWsDetachedSender};
use esp_idf_svc::http::Method;
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::io::Write;
use esp_idf_svc::sys::EspError;
use esp_idf_svc::ws::FrameType;
use log::{debug, error, info, warn};

use super::notify::TaskNotify;
use super::sender::{LaneSender, SendPump};
use super::ui::{UiInbound, UiTransport};
use crate::app::commands::ControlCommand;
use crate::app::ports::{Sender, SystemPort};
use crate::error::SendError;
use crate::runtime::RuntimeHandle;

/// Default WebSocket port.
pub const WS_PORT: u16 = 8888;
/// Largest inbound frame accepted.
const MAX_FRAME_LEN: usize = 4096;

type Client = Arc<Mutex<Option<EspHttpWsDetachedSender>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HTTP server with a single `/ws` endpoint plus the send-lane pump.
pub struct WsTransport {
    runtime: RuntimeHandle,
    system: Arc<dyn SystemPort>,
    port: u16,
    client: Client,
    server: Option<EspHttpServer<'static>>,
    pump: Option<SendPump>,
}

impl WsTransport {
    pub fn new(runtime: RuntimeHandle, system: Arc<dyn SystemPort>, port: u16) -> Self {
        Self {
            runtime,
            system,
            port,
            client: Arc::new(Mutex::new(None)),
            server: None,
            pump: None,
        }
    }

    fn start_server(&mut self) -> Result<EspHttpServer<'static>, EspError> {
        let mut server = EspHttpServer::new(&Configuration {
            http_port: self.port,
            ..Default::default()
        })?;

        let inbound = Arc::new(Mutex::new(UiInbound::new(self.runtime.clone())));
        let client = Arc::clone(&self.client);
        server.ws_handler("/ws", move |ws: &mut EspHttpWsConnection| {
            handle_ws(ws, &inbound, &client)
        })?;

        let runtime = self.runtime.clone();
        let system = Arc::clone(&self.system);
        server.fn_handler("/control", Method::Get, move |req| {
            handle_control(req, &runtime, system.as_ref())
        })?;
        Ok(server)
    }

    fn spawn_pump(&self) -> std::io::Result<SendPump> {
        let client = Arc::clone(&self.client);
        SendPump::spawn(
            "ws-pump",
            6 * 1024,
            self.runtime.shared_queue(),
            Arc::new(TaskNotify::new()),
            move |frame| match lock(&client).as_mut() {
                Some(tx) => tx
                    .send(FrameType::Binary(false), frame)
                    .map_err(|_| SendError::TransportFailed),
                None => Err(SendError::NotConnected),
            },
        )
    }
}

fn handle_ws(
    ws: &mut EspHttpWsConnection,
    inbound: &Mutex<UiInbound>,
    client: &Client,
) -> Result<(), EspError> {
    if ws.is_new() {
        info!("WS: client connected (session {})", ws.session());
        *lock(client) = Some(ws.create_detached_sender()?);
        lock(inbound).on_conninfo(true);
        return Ok(());
    }
    if ws.is_closed() {
        info!("WS: client disconnected (session {})", ws.session());
        *lock(client) = None;
        lock(inbound).on_conninfo(false);
        return Ok(());
    }

    let (_, len) = ws.recv(&mut [])?;
    if len > MAX_FRAME_LEN {
        warn!("WS: {} byte frame exceeds {}, dropped", len, MAX_FRAME_LEN);
        let mut sink = [0u8; 64];
        let mut left = len;
        while left > 0 {
            let (_, n) = ws.recv(&mut sink)?;
            if n == 0 {
                break;
            }
            left = left.saturating_sub(n);
        }
        return Ok(());
    }
    let mut buf = vec![0u8; len];
    let (frame, n) = ws.recv(&mut buf)?;
    match frame {
        FrameType::Text(_) | FrameType::Binary(_) => lock(inbound).on_message(&buf[..n]),
        other => debug!("WS: ignoring {:?} frame", other),
    }
    Ok(())
}

fn handle_control(
    req: Request<&mut EspHttpConnection<'_>>,
    runtime: &RuntimeHandle,
    system: &dyn SystemPort,
) -> Result<(), EspError> {
    let query = req.uri().split_once('?').map_or("", |(_, q)| q);
    let Some(cmd) = ControlCommand::from_query(query) else {
        warn!("Control: bad request '{}'", req.uri());
        req.into_status_response(400)?.write_all(b"bad command")?;
        return Ok(());
    };
    // Reply first: a reboot takes the server down.
    req.into_ok_response()?.write_all(b"ok")?;
    runtime.handle_command(cmd, system);
    Ok(())
}

impl UiTransport for WsTransport {
    fn start(&mut self) -> Result<(), SendError> {
        let server = self.start_server().map_err(|e| {
            error!("WS: server start on port {} failed: {}", self.port, e);
            SendError::TransportFailed
        })?;
        let pump = self.spawn_pump().map_err(|e| {
            error!("WS: pump task spawn failed: {}", e);
            SendError::TransportFailed
        })?;
        self.server = Some(server);
        self.pump = Some(pump);
        info!("WS: listening on port {}", self.port);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(pump) = self.pump.take() {
            if !pump.stop() {
                warn!("WS: pump task panicked");
            }
        }
        self.server = None;
        *lock(&self.client) = None;
        let dropped = self.runtime.queue().send().drain_all().len();
        info!("WS: stopped ({} queued frame(s) dropped)", dropped);
    }

    fn sender(&self) -> Box<dyn Sender> {
        match &self.pump {
            Some(pump) => Box::new(pump.sender()),
            // Not started: frames wait on the lane and are dropped by `stop`.
            None => Box::new(LaneSender::new(
                self.runtime.shared_queue(),
                Arc::new(TaskNotify::new()),
            )),
        }
    }
}
