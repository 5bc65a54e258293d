//! BLE UI transport.
//!
//! One GATT service with a write characteristic (client → node) and an
//! indicate characteristic (node → client).  Both directions carry
//! length-prefixed records, see [`record`](super::record).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw `esp_idf_svc::sys`.
//! - **all other targets**: simulation stubs; the GATT event handlers
//!   below are still reachable so the bridge logic is host-testable.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                          | Perms           |
//! |----------------|-------------------------------|-----------------|
//! | UI RX          | `6e400002-…-e50e24dcca9e`     | Write           |
//! | UI TX          | `6e400003-…-e50e24dcca9e`     | Read+Indicate   |

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use super::sender::{BleSender, IndicationLink};
use super::ui::{UiInbound, UiTransport};
use crate::app::ports::Sender;
use crate::error::SendError;
use crate::runtime::RuntimeHandle;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x6e400001_b5a3_f393_e0a9_e50e24dcca9e;
pub const CHAR_UI_RX: u128 = 0x6e400002_b5a3_f393_e0a9_e50e24dcca9e;
pub const CHAR_UI_TX: u128 = 0x6e400003_b5a3_f393_e0a9_e50e24dcca9e;

/// ATT MTU before the client negotiates a larger one.
pub const DEFAULT_MTU: u32 = 23;
/// MTU the server offers.
pub const LOCAL_MTU: u16 = 517;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Failed,
}

// ── Callback bridge ───────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These statics bridge the callback context to the adapter.

static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
static BLE_MTU: AtomicU32 = AtomicU32::new(DEFAULT_MTU);
#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_RX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_TX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);

// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
static UI_INBOUND: Mutex<Option<UiInbound>> = Mutex::new(None);

fn inbound() -> MutexGuard<'static, Option<UiInbound>> {
    UI_INBOUND.lock().unwrap_or_else(PoisonError::into_inner)
}

fn on_connect(conn_id: u16) {
    BLE_CONN_ID.store(u32::from(conn_id), Ordering::Relaxed);
    BLE_MTU.store(DEFAULT_MTU, Ordering::Relaxed);
    BLE_CONNECTED.store(true, Ordering::Release);
    info!("BLE GATTS: client connected (conn_id={})", conn_id);
    if let Some(ui) = inbound().as_mut() {
        ui.on_conninfo(true);
    }
}

fn on_disconnect() {
    BLE_CONNECTED.store(false, Ordering::Release);
    info!("BLE GATTS: client disconnected");
    if let Some(ui) = inbound().as_mut() {
        ui.on_conninfo(false);
    }
}

fn on_mtu(mtu: u16) {
    debug!("BLE GATTS: MTU {}", mtu);
    BLE_MTU.store(u32::from(mtu), Ordering::Relaxed);
}

fn on_rx_write(data: &[u8]) {
    if let Some(ui) = inbound().as_mut() {
        ui.on_record(data);
    }
}

// ───────────────────────────────────────────────────────────────
// Indication link
// ───────────────────────────────────────────────────────────────

/// The connected central, reached through the TX characteristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct GattsLink;

impl IndicationLink for GattsLink {
    fn is_connected(&self) -> bool {
        BLE_CONNECTED.load(Ordering::Acquire)
    }

    fn mtu(&self) -> usize {
        BLE_MTU.load(Ordering::Relaxed) as usize
    }

    #[cfg(target_os = "espidf")]
    fn indicate(&mut self, record: &[u8]) -> Result<(), SendError> {
        use esp_idf_svc::sys::*;
        let handle = BLE_TX_CHAR_HANDLE.load(Ordering::Relaxed);
        if handle == 0 {
            return Err(SendError::NotConnected);
        }
        let Ok(len) = u16::try_from(record.len()) else {
            return Err(SendError::TooLarge);
        };
        // SAFETY: Bluedroid copies `record` before returning.
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(Ordering::Relaxed) as u8,
                BLE_CONN_ID.load(Ordering::Relaxed) as u16,
                handle as u16,
                len,
                record.as_ptr() as *mut u8,
                true,
            )
        };
        if ret != ESP_OK as i32 {
            warn!("BLE: indicate failed ({})", ret);
            return Err(SendError::TransportFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn indicate(&mut self, record: &[u8]) -> Result<(), SendError> {
        debug!("BLE(sim): indicate {} bytes", record.len());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF GAP / GATTS handlers
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: all-zero is a valid esp_bt_uuid_t; the union field written
    // matches `len`.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    unsafe {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..core::mem::zeroed()
        };
        esp_ble_gap_start_advertising(&mut adv_params);
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(u32::from(gatts_if), Ordering::Relaxed);

    // SAFETY: Bluedroid passes a valid `param` whose active union member
    // is selected by `event`.
    unsafe {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                info!("BLE GATTS: app registered (if={})", gatts_if);
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid128_to_esp(SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = (*param).create.service_handle;
                BLE_SVC_HANDLE.store(u32::from(svc_handle), Ordering::Relaxed);
                esp_ble_gatts_start_service(svc_handle);
                BLE_CHAR_STEP.store(1, Ordering::Relaxed);
                add_gatt_char(
                    svc_handle,
                    CHAR_UI_RX,
                    ESP_GATT_PERM_WRITE,
                    ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR,
                );
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = (*param).add_char.attr_handle;
                let svc_handle = BLE_SVC_HANDLE.load(Ordering::Relaxed) as u16;
                match BLE_CHAR_STEP.load(Ordering::Relaxed) {
                    1 => {
                        BLE_RX_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                        BLE_CHAR_STEP.store(2, Ordering::Relaxed);
                        add_gatt_char(
                            svc_handle,
                            CHAR_UI_TX,
                            ESP_GATT_PERM_READ,
                            ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_INDICATE,
                        );
                    }
                    2 => {
                        BLE_TX_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                        BLE_CHAR_STEP.store(3, Ordering::Relaxed);
                        // Client configuration descriptor so the central can
                        // subscribe to indications.
                        let mut cccd: esp_bt_uuid_t = core::mem::zeroed();
                        cccd.len = 2;
                        cccd.uuid.uuid16 = ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16;
                        esp_ble_gatts_add_char_descr(
                            svc_handle,
                            &mut cccd,
                            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                            core::ptr::null_mut(),
                            core::ptr::null_mut(),
                        );
                    }
                    _ => {}
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                info!(
                    "BLE GATTS: UI service ready (rx={}, tx={})",
                    BLE_RX_CHAR_HANDLE.load(Ordering::Relaxed),
                    BLE_TX_CHAR_HANDLE.load(Ordering::Relaxed)
                );
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                on_connect((*param).connect.conn_id);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                on_disconnect();
                start_advertising();
            }
            esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
                on_mtu((*param).mtu.mtu);
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = &(*param).write;
                if u32::from(p.handle) == BLE_RX_CHAR_HANDLE.load(Ordering::Relaxed) {
                    let data = core::slice::from_raw_parts(p.value, usize::from(p.len));
                    on_rx_write(data);
                }
                if p.need_rsp {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        core::ptr::null_mut(),
                    );
                }
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

/// Bluedroid GATT server carrying the UI link.
pub struct BleUiAdapter {
    runtime: RuntimeHandle,
    device_name: heapless::String<24>,
    state: BleState,
}

impl BleUiAdapter {
    pub fn new(runtime: RuntimeHandle, device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            runtime,
            device_name: name,
            state: BleState::Idle,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), SendError> {
        use esp_idf_svc::sys::*;

        let Ok(name) = std::ffi::CString::new(self.device_name.as_str()) else {
            return Err(SendError::TransportFailed);
        };
        // SAFETY: plain Bluedroid bring-up sequence from a task context;
        // `name` outlives the call that reads it.
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();

            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK as i32 {
                log::error!("BLE: bt_controller_init failed ({})", ret);
                return Err(SendError::TransportFailed);
            }
            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK as i32 {
                log::error!("BLE: bt_controller_enable failed ({})", ret);
                return Err(SendError::TransportFailed);
            }
            let ret = esp_bluedroid_init();
            if ret != ESP_OK as i32 {
                log::error!("BLE: bluedroid_init failed ({})", ret);
                return Err(SendError::TransportFailed);
            }
            let ret = esp_bluedroid_enable();
            if ret != ESP_OK as i32 {
                log::error!("BLE: bluedroid_enable failed ({})", ret);
                return Err(SendError::TransportFailed);
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);
            esp_ble_gatt_set_local_mtu(LOCAL_MTU);

            esp_ble_gap_set_device_name(name.as_ptr());
            start_advertising();
        }
        info!(
            "BLE(espidf): Bluedroid stack initialized, advertising as '{}'",
            self.device_name
        );
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), SendError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        // SAFETY: tear-down mirrors the bring-up order; no callbacks are
        // pending once bluedroid is disabled.
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        BLE_CHAR_STEP.store(0, Ordering::Relaxed);
        BLE_TX_CHAR_HANDLE.store(0, Ordering::Relaxed);
        BLE_RX_CHAR_HANDLE.store(0, Ordering::Relaxed);
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }
}

impl UiTransport for BleUiAdapter {
    fn start(&mut self) -> Result<(), SendError> {
        *inbound() = Some(UiInbound::new(self.runtime.clone()));
        match self.platform_start() {
            Ok(()) => {
                self.state = BleState::Advertising;
                Ok(())
            }
            Err(e) => {
                *inbound() = None;
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.platform_stop();
        if BLE_CONNECTED.swap(false, Ordering::AcqRel) {
            warn!("BLE: stopped with a client connected");
        }
        *inbound() = None;
        self.state = BleState::Idle;
    }

    fn sender(&self) -> Box<dyn Sender> {
        Box::new(BleSender::new(GattsLink))
    }
}
