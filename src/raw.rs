//! The raw bench console: the driver on a string.
//!
//! An alternative to the slot manager for bring-up and RF debugging,
//! selected at build time by the firmware. No slot protocol runs; the
//! operator talks straight to the driver and every received packet
//! streams back as a `rcv` hex line.
//!
//! Verbs (the external dispatcher strips the `nrf` prefix):
//!
//! - `tx <hex>`: transmit one raw packet.
//! - `ack <hex>`: queue one raw acknowledge payload.
//! - `stat`: STATUS register and retransmit-exhaustion counter, as
//!   `OK s=SS r=NN`.
//! - `r <reg> [len]`: read a register, `OK <hex>`.
//! - `w <reg> <hex>`: write a register.

use core::fmt::Write;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use heapless::String;

use crate::console::{next_token, parse_hex_bytes, parse_int, Console};
use crate::consts::MAX_PACKET_LEN;
use crate::radio::{Nrf24l01, Packet, RadioOptions};
use crate::timer::Clock;

/// Longest raw line: a 32-byte packet in hex plus framing.
const LINE_LEN: usize = 128;

/// Widest register the chip has, in bytes.
const MAX_REGISTER_LEN: usize = 5;

/// Console access to a bare [`Nrf24l01`].
pub struct RawManager<SPI, CS, CE, IRQ, T> {
    nrf: Option<Nrf24l01<SPI, CS, CE, IRQ, T>>,
    line: String<LINE_LEN>,
}

impl<SPI, CS, CE, IRQ, T> RawManager<SPI, CS, CE, IRQ, T>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    CE: OutputPin,
    IRQ: InputPin,
    T: Clock,
{
    /// Wraps an already-constructed driver.
    pub fn new(nrf: Nrf24l01<SPI, CS, CE, IRQ, T>) -> Self {
        RawManager {
            nrf: Some(nrf),
            line: String::new(),
        }
    }

    /// Releases the underlying driver, consuming the manager.
    #[cfg(test)]
    pub(crate) fn into_radio(mut self) -> Nrf24l01<SPI, CS, CE, IRQ, T> {
        self.nrf.take().expect("radio already released")
    }

    /// Rebuilds the driver with new options (a persistent-config
    /// change).
    pub fn set_options(&mut self, options: &RadioOptions) {
        if let Some(nrf) = self.nrf.take() {
            let (spi, cs, ce, irq, timer) = nrf.release();
            self.nrf = Some(Nrf24l01::new(spi, cs, ce, irq, timer, options.clone()));
        }
    }

    /// Services the radio and streams anything received.
    pub fn poll<C: Console>(&mut self, console: &mut C) {
        let Some(nrf) = self.nrf.as_mut() else {
            return;
        };
        nrf.poll();

        if !nrf.is_data_ready() {
            return;
        }
        let mut packet = Packet::new();
        nrf.read(&mut packet);

        if console.write_outstanding() {
            return;
        }
        self.line.clear();
        let _ = self.line.push_str("rcv ");
        for &byte in packet.iter() {
            let _ = write!(self.line, "{:02X}", byte);
        }
        let _ = self.line.push_str("\r\n");
        console.write_line(&self.line);
    }

    /// Millisecond tick for the driver's bring-up machine.
    pub fn poll_millisecond(&mut self) {
        if let Some(nrf) = self.nrf.as_mut() {
            nrf.poll_millisecond();
        }
    }

    /// Dispatches one console command (already stripped of its `nrf`
    /// prefix).
    pub fn command<C: Console>(&mut self, line: &str, console: &mut C) {
        let (verb, rest) = next_token(line);
        match verb {
            "tx" => self.command_tx(rest, console),
            "ack" => self.command_ack(rest, console),
            "stat" => self.command_stat(console),
            "r" => self.command_read(rest, console),
            "w" => self.command_write(rest, console),
            _ => console.write_line("ERR unknown command\r\n"),
        }
    }

    fn parse_packet<C: Console>(hex: &str, console: &mut C) -> Option<Packet> {
        if hex.len() % 2 != 0 {
            console.write_line("ERR data invalid length\r\n");
            return None;
        }
        let mut bytes = [0u8; MAX_PACKET_LEN];
        let Some(count) = parse_hex_bytes(hex, &mut bytes) else {
            console.write_line("ERR invalid data\r\n");
            return None;
        };
        let mut packet = Packet::new();
        let _ = packet.extend_from_slice(&bytes[..count]);
        Some(packet)
    }

    fn command_tx<C: Console>(&mut self, rest: &str, console: &mut C) {
        let (hex, _) = next_token(rest);
        let Some(packet) = Self::parse_packet(hex, console) else {
            return;
        };
        if let Some(nrf) = self.nrf.as_mut() {
            nrf.transmit(&packet);
            console.write_line("OK\r\n");
        }
    }

    fn command_ack<C: Console>(&mut self, rest: &str, console: &mut C) {
        let (hex, _) = next_token(rest);
        let Some(packet) = Self::parse_packet(hex, console) else {
            return;
        };
        if let Some(nrf) = self.nrf.as_mut() {
            nrf.queue_ack(&packet);
            console.write_line("OK\r\n");
        }
    }

    fn command_stat<C: Console>(&mut self, console: &mut C) {
        let Some(nrf) = self.nrf.as_mut() else {
            return;
        };
        let status = nrf.status();
        self.line.clear();
        let _ = write!(
            self.line,
            "OK s={:02X} r={}\r\n",
            status.status_reg, status.retransmit_exceeded
        );
        console.write_line(&self.line);
    }

    fn command_read<C: Console>(&mut self, rest: &str, console: &mut C) {
        let (reg_str, rest) = next_token(rest);
        let (len_str, _) = next_token(rest);

        let Some(register) = parse_int(reg_str) else {
            console.write_line("ERR invalid register\r\n");
            return;
        };
        let length = if len_str.is_empty() {
            1
        } else {
            match parse_int(len_str) {
                Some(length) if (1..=MAX_REGISTER_LEN as u32).contains(&length) => length as usize,
                _ => {
                    console.write_line("ERR invalid length\r\n");
                    return;
                }
            }
        };

        let Some(nrf) = self.nrf.as_mut() else {
            return;
        };
        let mut bytes = [0u8; MAX_REGISTER_LEN];
        nrf.read_register(register as u8, &mut bytes[..length]);

        self.line.clear();
        let _ = self.line.push_str("OK ");
        for &byte in &bytes[..length] {
            let _ = write!(self.line, "{:02X}", byte);
        }
        let _ = self.line.push_str("\r\n");
        console.write_line(&self.line);
    }

    fn command_write<C: Console>(&mut self, rest: &str, console: &mut C) {
        let (reg_str, rest) = next_token(rest);
        let (hex, _) = next_token(rest);

        let Some(register) = parse_int(reg_str) else {
            console.write_line("ERR invalid register\r\n");
            return;
        };
        let mut bytes = [0u8; MAX_REGISTER_LEN];
        let Some(count) = parse_hex_bytes(hex, &mut bytes) else {
            console.write_line("ERR invalid data\r\n");
            return;
        };

        if let Some(nrf) = self.nrf.as_mut() {
            nrf.write_register(register as u8, &bytes[..count]);
            console.write_line("OK\r\n");
        }
    }
}
