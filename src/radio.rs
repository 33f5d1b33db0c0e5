//! nRF24L01+ driver.
//!
//! This module owns one transceiver behind an SPI bus and three GPIO
//! lines (chip select, CE, active-low IRQ) and exposes it as a
//! packet-oriented device: configure once, then `transmit` frames or
//! drain received ones out of `poll`.
//!
//! The chip cannot be commanded immediately after power-up, so bring-up
//! is a small state machine driven from [`Nrf24l01::poll_millisecond`]:
//!
//! - `PowerOnReset`: hold CE low and stay off SPI until the chip's
//!   power-on window has passed, then write CONFIG.
//! - `EnteringStandby`: give the oscillator its settling time, then run
//!   the full register configuration with read-back verification.
//! - `Standby`: ready. A primary receiver drives CE high here and
//!   listens; a primary transmitter pulses CE per frame.
//!
//! Every register in the configuration sequence is verified by reading
//! it back; a mismatch means the bus or chip is broken and the system
//! halts. Once in standby, reconfiguration means building a new
//! instance: there is no partial re-init.
//!
//! `poll` is level-triggered on the IRQ line and idempotent while the
//! line is high. Retransmit exhaustion and RX overflow are counted, not
//! fatal.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use heapless::Vec;

use crate::consts::*;
use crate::fatal::{fatal, Fatal};
use crate::timer::Clock;

/// One on-air payload: up to 32 bytes. The same type rides both
/// directions.
pub type Packet = Vec<u8, MAX_PACKET_LEN>;

/// Immutable configuration for one radio. Built once, consumed by the
/// driver; changing anything means constructing a new driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioOptions {
    /// Primary transmitter when true, primary receiver when false.
    pub ptx: bool,
    /// On-air address length in bytes, 3..=5.
    pub address_length: u8,
    /// On-air address, least significant byte first on the wire.
    pub id: u64,
    /// Enable dynamic payload lengths on pipe 0.
    pub dynamic_payload_length: bool,
    /// Enable the on-air CRC.
    pub enable_crc: bool,
    /// CRC length in bytes, 1 or 2.
    pub crc_length: u8,
    /// Hardware auto-retransmit attempts, 0..=15.
    pub auto_retransmit_count: u8,
    /// Delay between auto-retransmit attempts, quantized to 250 µs.
    pub auto_retransmit_delay_us: u32,
    /// Enable hardware auto-acknowledge on pipe 0.
    pub automatic_acknowledgment: bool,
    /// RF channel selected during configuration.
    pub initial_channel: u8,
    /// Air data rate in bits per second: 250_000, 1_000_000 or 2_000_000.
    pub data_rate: u32,
    /// Output power in dBm: -18, -12, -6, 0 or +7.
    pub output_power: i8,
}

impl Default for RadioOptions {
    fn default() -> Self {
        RadioOptions {
            ptx: true,
            address_length: 5,
            id: 0x200F,
            dynamic_payload_length: true,
            enable_crc: true,
            crc_length: 2,
            auto_retransmit_count: 0,
            auto_retransmit_delay_us: 1000,
            automatic_acknowledgment: false,
            initial_channel: 2,
            data_rate: 1_000_000,
            output_power: 0,
        }
    }
}

/// Bring-up progress. Transitions happen only in `poll_millisecond`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    /// Waiting out the chip's power-on window; CE held low.
    PowerOnReset,
    /// CONFIG written, waiting for the settling time before full
    /// configuration.
    EnteringStandby,
    /// Configured and ready for commands.
    Standby,
}

/// Snapshot returned by [`Nrf24l01::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioStatus {
    /// The live STATUS register.
    pub status_reg: u8,
    /// Times the auto-retransmit count was exhausted since start.
    pub retransmit_exceeded: u32,
}

/// The packet-radio surface the slot protocol engine drives. The real
/// driver implements it; tests substitute a scripted fake.
pub trait PacketRadio {
    /// Services the interrupt line; no-op while it is high.
    fn poll(&mut self);
    /// Advances the bring-up state machine; called once per millisecond.
    fn poll_millisecond(&mut self);
    /// True once configuration has finished.
    fn ready(&self) -> bool;
    /// Retunes the synthesizer, verifying the register write.
    fn select_rf_channel(&mut self, channel: u8);
    /// True while a received packet is latched and unread.
    fn is_data_ready(&self) -> bool;
    /// Moves the latched packet into `packet`; false if none was ready.
    fn read(&mut self, packet: &mut Packet) -> bool;
    /// Loads a payload and pulses CE to send it (primary transmitter).
    fn transmit(&mut self, packet: &Packet);
    /// Loads a payload to ride on the next acknowledge (pipe 0).
    fn queue_ack(&mut self, packet: &Packet);
    /// Accumulated transient error flags (`ERROR_*` bits).
    fn error(&self) -> u32;
    /// Tears the radio down and rebuilds it with new options.
    fn reconfigure(self, options: &RadioOptions) -> Self
    where
        Self: Sized;
}

/// Driver for one nRF24L01+ on an SPI bus.
pub struct Nrf24l01<SPI, CS, CE, IRQ, T> {
    spi: SPI,
    cs: CS,
    ce: CE,
    irq: IRQ,
    timer: T,
    options: RadioOptions,
    state: RadioState,
    entered_standby_wait: u32,
    rx_packet: Packet,
    data_ready: bool,
    rx_overflow: bool,
    retransmit_exceeded: u32,
}

impl<SPI, CS, CE, IRQ, T> Nrf24l01<SPI, CS, CE, IRQ, T>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    CE: OutputPin,
    IRQ: InputPin,
    T: Clock,
{
    /// Takes ownership of the bus, pins and timer. Drives CE low and CS
    /// high, but does not talk to the chip yet; bring-up runs from
    /// [`poll_millisecond`](Self::poll_millisecond).
    pub fn new(spi: SPI, cs: CS, ce: CE, irq: IRQ, timer: T, options: RadioOptions) -> Self {
        let mut cs = cs;
        let mut ce = ce;
        let _ = cs.set_high();
        let _ = ce.set_low();
        Nrf24l01 {
            spi,
            cs,
            ce,
            irq,
            timer,
            options,
            state: RadioState::PowerOnReset,
            entered_standby_wait: 0,
            rx_packet: Packet::new(),
            data_ready: false,
            rx_overflow: false,
            retransmit_exceeded: 0,
        }
    }

    /// One SPI command transaction: the opcode byte clocks the STATUS
    /// register back, then `max(in, out)` data bytes are exchanged, with
    /// zero padding once `data_in` runs out and extra replies discarded.
    fn command(&mut self, opcode: u8, data_in: &[u8], data_out: &mut [u8]) -> u8 {
        let transfer = data_in.len().max(data_out.len());

        let mut tx = [0u8; MAX_PACKET_LEN + 1];
        let mut rx = [0u8; MAX_PACKET_LEN + 1];
        tx[0] = opcode;
        tx[1..1 + data_in.len()].copy_from_slice(data_in);

        let _ = self.cs.set_low();
        // Chip select setup time before the first clock edge.
        self.timer.wait_us(CS_SETUP_US);
        if self
            .spi
            .transfer(&mut rx[..transfer + 1], &tx[..transfer + 1])
            .is_err()
        {
            fatal(Fatal::SpiBus);
        }
        let _ = self.cs.set_high();

        data_out.copy_from_slice(&rx[1..1 + data_out.len()]);
        rx[0]
    }

    fn write_reg(&mut self, address: u8, data: &[u8]) -> u8 {
        self.command(CMD_W_REGISTER + address, data, &mut [])
    }

    fn read_reg(&mut self, address: u8, data: &mut [u8]) -> u8 {
        self.command(CMD_R_REGISTER + address, &[], data)
    }

    /// Writes a register and reads it back; a mismatch halts the system.
    fn verify_reg(&mut self, address: u8, data: &[u8]) {
        self.write_reg(address, data);
        let mut readback = [0u8; 8];
        self.read_reg(address, &mut readback[..data.len()]);
        if &readback[..data.len()] != data {
            fatal(Fatal::RegisterVerify(address));
        }
    }

    fn config_byte(&self) -> u8 {
        // All three interrupt sources stay unmasked onto the IRQ pin.
        (if self.options.enable_crc { CONFIG_EN_CRC } else { 0 })
            | (if self.options.crc_length == 2 { CONFIG_CRCO } else { 0 })
            | CONFIG_PWR_UP
            | (if self.options.ptx { 0 } else { CONFIG_PRIM_RX })
    }

    fn setup_aw_byte(&self) -> u8 {
        match self.options.address_length {
            3 => 1,
            4 => 2,
            5 => 3,
            _ => fatal(Fatal::UnsupportedAddressLength),
        }
    }

    fn setup_retr_byte(&self) -> u8 {
        let delay = (self.options.auto_retransmit_delay_us / 250).min(15) as u8;
        let count = self.options.auto_retransmit_count.min(15);
        (delay << 4) | count
    }

    fn rf_setup_byte(&self) -> u8 {
        let rate = match self.options.data_rate {
            250_000 => 1 << 5,
            1_000_000 => 0,
            2_000_000 => 1 << 3,
            _ => fatal(Fatal::UnsupportedDataRate),
        };
        let power = match self.options.output_power {
            -18 => 0,
            -12 => 2,
            -6 => 4,
            0 => 6,
            7 => 1,
            _ => fatal(Fatal::UnsupportedOutputPower),
        };
        rate | power
    }

    fn dynpd_byte(&self) -> u8 {
        let dynamic =
            self.options.dynamic_payload_length || self.options.automatic_acknowledgment;
        if dynamic {
            0x01
        } else {
            0x00
        }
    }

    fn feature_byte(&self) -> u8 {
        let ack = self.options.automatic_acknowledgment;
        let dynamic = self.options.dynamic_payload_length || ack;
        (if dynamic { FEATURE_EN_DPL } else { 0 })
            | (if ack { FEATURE_EN_ACK_PAY } else { 0 })
            | (if ack { FEATURE_EN_DYN_ACK } else { 0 })
    }

    /// The full verified register sequence, run once on the way into
    /// standby. Order follows the datasheet walk-through: framing,
    /// retransmit, channel, RF, addresses, then the dynamic-payload
    /// features.
    fn configure(&mut self) {
        let config = self.config_byte();
        self.verify_reg(REG_CONFIG, &[config]);

        let en_aa = if self.options.automatic_acknowledgment {
            0x01
        } else {
            0x00
        };
        self.verify_reg(REG_EN_AA, &[en_aa]);
        self.verify_reg(REG_EN_RXADDR, &[0x01]);
        let setup_aw = self.setup_aw_byte();
        self.verify_reg(REG_SETUP_AW, &[setup_aw]);
        let setup_retr = self.setup_retr_byte();
        self.verify_reg(REG_SETUP_RETR, &[setup_retr]);

        self.set_rf_channel(self.options.initial_channel);

        let rf_setup = self.rf_setup_byte();
        self.verify_reg(REG_RF_SETUP, &[rf_setup]);

        let address = self.options.id.to_le_bytes();
        let length = usize::from(self.options.address_length);
        let mut bytes = [0u8; 5];
        bytes[..length].copy_from_slice(&address[..length]);
        self.verify_reg(REG_RX_ADDR_P0, &bytes[..length]);
        self.verify_reg(REG_TX_ADDR, &bytes[..length]);

        let dynpd = self.dynpd_byte();
        self.verify_reg(REG_DYNPD, &[dynpd]);
        let feature = self.feature_byte();
        self.verify_reg(REG_FEATURE, &[feature]);

        // A primary receiver listens continuously from here on.
        if !self.options.ptx {
            let _ = self.ce.set_high();
        }

        #[cfg(feature = "log")]
        log::info!(
            "radio configured: {} ch={}",
            if self.options.ptx { "ptx" } else { "prx" },
            self.options.initial_channel
        );
    }

    fn set_rf_channel(&mut self, channel: u8) {
        self.verify_reg(REG_RF_CH, &[channel & 0x7F]);
    }

    fn assert_standby(&self) {
        if self.state != RadioState::Standby {
            fatal(Fatal::NotInStandby);
        }
    }

    /// Services the IRQ line. A no-op while the line is high or before
    /// the chip reaches standby.
    pub fn poll(&mut self) {
        if self.state != RadioState::Standby {
            return;
        }
        if self.irq.is_high().unwrap_or(true) {
            return;
        }

        let status = self.command(CMD_NOP, &[], &mut []);

        // A payload is waiting either on RX_DR, or, for a transmitter
        // with auto-acknowledge, when TX_DS reports an ack that may have
        // carried a payload back.
        if (status & STATUS_RX_DR) != 0
            || ((status & STATUS_TX_DS) != 0
                && self.options.automatic_acknowledgment
                && self.options.ptx)
        {
            let mut width = [0u8; 1];
            self.command(CMD_R_RX_PL_WID, &[], &mut width);
            let width = usize::from(width[0]).min(MAX_PACKET_LEN);

            self.rx_packet.clear();
            let _ = self.rx_packet.resize_default(width);
            if width > 0 {
                let mut payload = [0u8; MAX_PACKET_LEN];
                self.command(CMD_R_RX_PAYLOAD, &[], &mut payload[..width]);
                self.rx_packet[..width].copy_from_slice(&payload[..width]);
            }

            if self.data_ready {
                self.rx_overflow = true;
            }
            self.data_ready = true;
        }

        if (status & STATUS_MAX_RT) != 0 {
            self.retransmit_exceeded = self.retransmit_exceeded.wrapping_add(1);
            self.command(CMD_FLUSH_TX, &[], &mut []);
            #[cfg(feature = "log")]
            log::warn!("retransmit count exceeded ({})", self.retransmit_exceeded);
        }

        let to_clear = status & STATUS_IRQ_MASK;
        if to_clear != 0 {
            self.write_reg(REG_STATUS, &[to_clear]);
        }
    }

    /// Advances the bring-up state machine; call once per millisecond.
    pub fn poll_millisecond(&mut self) {
        let now = self.timer.read_ms();
        match self.state {
            RadioState::PowerOnReset => {
                let _ = self.ce.set_low();

                // Absolute: the chip only power-on resets once.
                if now < POWER_ON_RESET_MS {
                    return;
                }

                let config = self.config_byte();
                self.write_reg(REG_CONFIG, &[config]);
                self.state = RadioState::EnteringStandby;
                self.entered_standby_wait = now;
            }
            RadioState::EnteringStandby => {
                if now.wrapping_sub(self.entered_standby_wait) < STANDBY_SETTLE_MS {
                    return;
                }
                self.configure();
                self.state = RadioState::Standby;
            }
            RadioState::Standby => {}
        }
    }

    /// True once the chip is configured and in standby.
    pub fn ready(&self) -> bool {
        self.state == RadioState::Standby
    }

    /// Current bring-up state.
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Retunes to `channel`, verifying the write.
    pub fn select_rf_channel(&mut self, channel: u8) {
        self.assert_standby();
        self.set_rf_channel(channel);
    }

    /// True while a received packet is latched and unread.
    pub fn is_data_ready(&self) -> bool {
        self.data_ready
    }

    /// Moves the latched packet into `packet` and clears the ready flag.
    /// Returns false (and empties `packet`) if nothing was latched.
    pub fn read(&mut self, packet: &mut Packet) -> bool {
        packet.clear();
        if !self.data_ready {
            return false;
        }
        let _ = packet.extend_from_slice(&self.rx_packet);
        self.data_ready = false;
        true
    }

    /// Loads a payload into the TX FIFO and pulses CE to launch it.
    /// Only a primary transmitter may call this.
    pub fn transmit(&mut self, packet: &Packet) {
        if !self.options.ptx {
            fatal(Fatal::RoleMismatch);
        }
        self.assert_standby();

        self.command(CMD_W_TX_PAYLOAD, packet, &mut []);
        let _ = self.ce.set_high();
        self.timer.wait_us(CE_PULSE_US);
        let _ = self.ce.set_low();
    }

    /// Loads a payload to ride on the next pipe-0 acknowledge.
    pub fn queue_ack(&mut self, packet: &Packet) {
        self.assert_standby();
        self.command(CMD_W_ACK_PAYLOAD_P0, packet, &mut []);
    }

    /// The live STATUS register plus the retransmit-exhaustion counter.
    pub fn status(&mut self) -> RadioStatus {
        self.assert_standby();
        RadioStatus {
            status_reg: self.command(CMD_NOP, &[], &mut []),
            retransmit_exceeded: self.retransmit_exceeded,
        }
    }

    /// Raw register read for the bench console.
    pub fn read_register(&mut self, address: u8, data: &mut [u8]) {
        self.assert_standby();
        self.read_reg(address, data);
    }

    /// Raw register write for the bench console.
    pub fn write_register(&mut self, address: u8, data: &[u8]) {
        self.assert_standby();
        self.write_reg(address, data);
    }

    /// Accumulated transient error flags.
    pub fn error(&self) -> u32 {
        if self.rx_overflow {
            ERROR_RX_OVERFLOW
        } else {
            0
        }
    }

    /// Gives the bus, pins and timer back, consuming the driver.
    pub fn release(self) -> (SPI, CS, CE, IRQ, T) {
        (self.spi, self.cs, self.ce, self.irq, self.timer)
    }
}

impl<SPI, CS, CE, IRQ, T> PacketRadio for Nrf24l01<SPI, CS, CE, IRQ, T>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    CE: OutputPin,
    IRQ: InputPin,
    T: Clock,
{
    fn poll(&mut self) {
        Nrf24l01::poll(self);
    }

    fn poll_millisecond(&mut self) {
        Nrf24l01::poll_millisecond(self);
    }

    fn ready(&self) -> bool {
        Nrf24l01::ready(self)
    }

    fn select_rf_channel(&mut self, channel: u8) {
        Nrf24l01::select_rf_channel(self, channel);
    }

    fn is_data_ready(&self) -> bool {
        Nrf24l01::is_data_ready(self)
    }

    fn read(&mut self, packet: &mut Packet) -> bool {
        Nrf24l01::read(self, packet)
    }

    fn transmit(&mut self, packet: &Packet) {
        Nrf24l01::transmit(self, packet);
    }

    fn queue_ack(&mut self, packet: &Packet) {
        Nrf24l01::queue_ack(self, packet);
    }

    fn error(&self) -> u32 {
        Nrf24l01::error(self)
    }

    fn reconfigure(self, options: &RadioOptions) -> Self {
        let (spi, cs, ce, irq, timer) = self.release();
        Nrf24l01::new(spi, cs, ce, irq, timer, options.clone())
    }
}
