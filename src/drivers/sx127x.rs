//! SX1276/77/78/79 LoRa modem driver (receive path).
//!
//! Generic over [`embedded_hal::spi::SpiDevice`]; on the device that is an
//! `esp_idf_hal::spi::SpiDeviceDriver`, in tests a register-file mock.
//!
//! ## Register access
//!
//! | Byte 0            | Following bytes              |
//! |-------------------|------------------------------|
//! | `addr & 0x7F`     | read, address auto-increments|
//! | `addr \| 0x80`    | write                        |
//!
//! FIFO reads (`REG_FIFO`) do not increment the address; the modem walks
//! its FIFO pointer instead.

use embedded_hal::spi::{Operation, SpiDevice};
use log::{debug, info, warn};

use crate::app::ports::RadioPort;
use crate::error::RadioError;

// ── Registers ─────────────────────────────────────────────────

pub const REG_FIFO: u8 = 0x00;
pub const REG_OP_MODE: u8 = 0x01;
pub const REG_FRF_MSB: u8 = 0x06;
pub const REG_FRF_MID: u8 = 0x07;
pub const REG_FRF_LSB: u8 = 0x08;
pub const REG_FIFO_ADDR_PTR: u8 = 0x0D;
pub const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
pub const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
pub const REG_IRQ_FLAGS: u8 = 0x12;
pub const REG_RX_NB_BYTES: u8 = 0x13;
pub const REG_PKT_RSSI_VALUE: u8 = 0x1A;
pub const REG_HOP_CHANNEL: u8 = 0x1C;
pub const REG_DIO_MAPPING_1: u8 = 0x40;
pub const REG_VERSION: u8 = 0x42;

const MODE_LONG_RANGE: u8 = 0x80;
const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_RX_CONTINUOUS: u8 = 0x05;

const IRQ_CRC_ERROR: u8 = 0x20;
const IRQ_FHSS_CHANGE_CHANNEL: u8 = 0x02;

/// DIO0 = RxDone, DIO1 = FhssChangeChannel.
const DIO_MAPPING_RX: u8 = 0x10;

/// Silicon revision reported by every SX127x.
pub const EXPECTED_VERSION: u8 = 0x12;
/// RSSI offset for the high-frequency port (862-1020 MHz).
const RSSI_OFFSET_HF: i16 = -157;
const FXOSC_HZ: u64 = 32_000_000;

/// Evenly spaced channel plan used for frequency hopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopPlan {
    pub base_hz: u32,
    pub step_hz: u32,
    pub channels: u8,
}

impl HopPlan {
    /// Carrier for the channel following `current`.
    pub fn next_frequency(&self, current: u8) -> u32 {
        let next = (u32::from(current) + 1) % u32::from(self.channels.max(1));
        self.base_hz + next * self.step_hz
    }
}

/// FRF register value for `freq_hz`: `freq * 2^19 / FXOSC`.
pub fn frf_for(freq_hz: u32) -> u32 {
    ((u64::from(freq_hz) << 19) / FXOSC_HZ) as u32
}

pub struct Sx127x<SPI> {
    spi: SPI,
    hop_plan: Option<HopPlan>,
}

impl<SPI: SpiDevice> Sx127x<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            hop_plan: None,
        }
    }

    pub fn with_hop_plan(mut self, plan: HopPlan) -> Self {
        self.hop_plan = Some(plan);
        self
    }

    /// Check the chip, tune to `freq_hz` and enter continuous receive.
    pub fn init(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        let version = self.read_reg(REG_VERSION)?;
        if version != EXPECTED_VERSION {
            warn!("sx127x: unexpected version 0x{:02x}", version);
        }
        self.write_reg(REG_OP_MODE, MODE_LONG_RANGE | MODE_SLEEP)?;
        self.set_frequency(freq_hz)?;
        self.write_reg(REG_FIFO_RX_BASE_ADDR, 0)?;
        self.write_reg(REG_DIO_MAPPING_1, DIO_MAPPING_RX)?;
        self.write_reg(REG_OP_MODE, MODE_LONG_RANGE | MODE_STDBY)?;
        self.start_receive()?;
        info!("sx127x: rx at {} Hz (version 0x{:02x})", freq_hz, version);
        Ok(())
    }

    pub fn set_frequency(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        let frf = frf_for(freq_hz);
        self.write_reg(REG_FRF_MSB, (frf >> 16) as u8)?;
        self.write_reg(REG_FRF_MID, (frf >> 8) as u8)?;
        self.write_reg(REG_FRF_LSB, frf as u8)
    }

    pub fn start_receive(&mut self) -> Result<(), RadioError> {
        self.write_reg(REG_OP_MODE, MODE_LONG_RANGE | MODE_RX_CONTINUOUS)
    }

    pub fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError> {
        let mut buf = [reg & 0x7F, 0];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| RadioError::Spi)?;
        Ok(buf[1])
    }

    pub fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        self.spi
            .write(&[reg | 0x80, value])
            .map_err(|_| RadioError::Spi)
    }

    fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), RadioError> {
        self.spi
            .transaction(&mut [Operation::Write(&[REG_FIFO]), Operation::Read(buf)])
            .map_err(|_| RadioError::Spi)
    }

    fn hop(&mut self) -> Result<bool, RadioError> {
        let flags = self.read_reg(REG_IRQ_FLAGS)?;
        if flags & IRQ_FHSS_CHANGE_CHANNEL == 0 {
            return Ok(false);
        }
        let channel = self.read_reg(REG_HOP_CHANNEL)? & 0x3F;
        if let Some(plan) = self.hop_plan {
            self.set_frequency(plan.next_frequency(channel))?;
        }
        self.write_reg(REG_IRQ_FLAGS, IRQ_FHSS_CHANGE_CHANNEL)?;
        debug!("sx127x: hop from channel {}", channel);
        Ok(true)
    }
}

impl<SPI: SpiDevice> RadioPort for Sx127x<SPI> {
    fn receive_packet(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        let flags = self.read_reg(REG_IRQ_FLAGS)?;
        self.write_reg(REG_IRQ_FLAGS, flags)?;
        if flags & IRQ_CRC_ERROR != 0 {
            return Err(RadioError::Crc);
        }
        let len = usize::from(self.read_reg(REG_RX_NB_BYTES)?);
        let addr = self.read_reg(REG_FIFO_RX_CURRENT_ADDR)?;
        self.write_reg(REG_FIFO_ADDR_PTR, addr)?;
        let n = len.min(buf.len());
        if n > 0 {
            self.read_fifo(&mut buf[..n])?;
        }
        Ok(n)
    }

    fn packet_rssi(&mut self) -> i16 {
        match self.read_reg(REG_PKT_RSSI_VALUE) {
            Ok(v) => RSSI_OFFSET_HF + i16::from(v),
            Err(e) => {
                warn!("sx127x: RSSI read failed: {}", e);
                i16::MIN
            }
        }
    }

    fn rearm_receive(&mut self) {
        if let Err(e) = self.start_receive() {
            warn!("sx127x: rx re-arm failed: {}", e);
        }
    }

    fn handle_hop(&mut self) -> bool {
        self.hop().unwrap_or_else(|e| {
            warn!("sx127x: hop handling failed: {}", e);
            false
        })
    }
}
