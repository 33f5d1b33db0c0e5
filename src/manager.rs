//! The slot link manager: console verbs in, report lines out.
//!
//! [`SlotManager`] sits between the protocol engine and whatever
//! carries the operator's console. Downstream it installs slot payloads
//! and priorities; upstream it watches the receive mirror's update
//! counters and turns changes into `rcv` lines (and, when enabled,
//! channel hops into `chan` lines).
//!
//! ## Verbs
//!
//! The external command dispatcher strips the `slot` prefix and hands
//! the rest to [`SlotManager::command`]:
//!
//! - `tx <slot> <hex>`: install a payload; replies `OK` or `ERR ...`.
//! - `pri <slot> <hex32>`: set a slot priority mask.
//!
//! Slot indices clamp into 0..=15. Payloads are bounded by what the
//! slot header can carry, 15 bytes.
//!
//! ## The transmit watchdog
//!
//! Every `tx` arms a countdown; if it ever runs out, all live slot
//! priorities drop to zero and the link goes quiet. A controller that
//! vanishes mid-flight stops commanding the air within the timeout
//! instead of replaying its last words forever. The per-slot priority
//! shadow survives, so the next `tx` picks up where it left off.

use core::fmt::Write;

use heapless::String;

use crate::console::{next_token, parse_hex_bytes, parse_int, Console};
use crate::consts::{MAX_SLOT_PAYLOAD, NUM_SLOTS};
use crate::frame::Slot;
use crate::protocol::{SlotOptions, SlotRf};
use crate::radio::PacketRadio;

/// Longest report line: sixteen slots of hex plus an error suffix.
const LINE_LEN: usize = 256;

/// Persistent configuration of the slot link (the `slot` namespace of
/// the external config store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotConfig {
    /// Primary transmitter when true.
    pub ptx: bool,
    /// The 32-bit pairing identifier.
    pub id: u32,
    /// Air data rate in bits per second.
    pub data_rate: u32,
    /// Output power in dBm.
    pub output_power: i8,
    /// Hardware auto-retransmit attempts.
    pub auto_retransmit_count: u8,
    /// Emit a `chan` line on every hop.
    pub print_channels: bool,
    /// Milliseconds of console silence before the watchdog silences the
    /// link; zero disables it.
    pub transmit_timeout_ms: u32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        SlotConfig {
            ptx: true,
            id: 0x3025_1023,
            data_rate: 1_000_000,
            output_power: 0,
            auto_retransmit_count: 0,
            print_channels: false,
            transmit_timeout_ms: 1000,
        }
    }
}

impl SlotConfig {
    /// The protocol options this configuration asks for.
    pub fn slot_options(&self) -> SlotOptions {
        SlotOptions {
            ptx: self.ptx,
            id: self.id,
            data_rate: self.data_rate,
            output_power: self.output_power,
            auto_retransmit_count: self.auto_retransmit_count,
        }
    }
}

/// Binds one protocol engine to the console.
pub struct SlotManager<R> {
    config: SlotConfig,
    engine: Option<SlotRf<R>>,
    /// Priority shadow per slot, applied whenever a payload arrives.
    priorities: [u32; NUM_SLOTS],
    last_bitfield: u32,
    last_channel: u8,
    timeout_remaining: u32,
    line: String<LINE_LEN>,
}

impl<R: PacketRadio> SlotManager<R> {
    /// Builds the engine around `radio`, which must have been
    /// constructed with `config.slot_options().radio_options()`.
    ///
    /// Slots start silent (no payload installed), but every priority
    /// shadow starts at all-ones so the first `tx` transmits every
    /// frame until told otherwise.
    pub fn new(radio: R, config: SlotConfig) -> Self {
        let engine = SlotRf::new(radio, config.slot_options());
        SlotManager {
            config,
            engine: Some(engine),
            priorities: [0xFFFF_FFFF; NUM_SLOTS],
            last_bitfield: 0,
            last_channel: 0,
            timeout_remaining: 0,
            line: String::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// Applies a new configuration by rebuilding the radio and engine
    /// from scratch. Priority shadows survive; link state does not.
    pub fn set_config(&mut self, config: SlotConfig) {
        self.config = config;
        if let Some(engine) = self.engine.take() {
            let radio = engine
                .release()
                .reconfigure(&self.config.slot_options().radio_options());
            self.engine = Some(SlotRf::new(radio, self.config.slot_options()));
        }
        #[cfg(feature = "log")]
        log::info!("slot link restarted");
    }

    /// Services the engine and reports what changed.
    pub fn poll<C: Console>(&mut self, console: &mut C) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.poll();

        let current = engine.slot_bitfield();
        let changed = current ^ self.last_bitfield;
        if changed != 0 {
            Self::emit_slots(&mut self.line, engine, console, changed);
        }
        self.last_bitfield = current;

        let channel = engine.channel();
        if self.config.print_channels && channel != self.last_channel {
            Self::emit_channel(&mut self.line, console, channel);
        }
        self.last_channel = channel;
    }

    /// Millisecond tick: runs the watchdog, then the engine's clock.
    pub fn poll_millisecond(&mut self) {
        let expired = self.timeout_remaining == 1;
        self.timeout_remaining = self.timeout_remaining.saturating_sub(1);
        if self.timeout_remaining == 0 && self.config.transmit_timeout_ms != 0 {
            if expired {
                #[cfg(feature = "log")]
                log::warn!("transmit watchdog expired, silencing slots");
            }
            self.disable_transmit();
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.poll_millisecond();
        }
    }

    /// Dispatches one console command (already stripped of its `slot`
    /// prefix).
    pub fn command<C: Console>(&mut self, line: &str, console: &mut C) {
        let (verb, rest) = next_token(line);
        match verb {
            "tx" => self.command_tx(rest, console),
            "pri" => self.command_pri(rest, console),
            _ => console.write_line("ERR unknown command\r\n"),
        }
    }

    fn command_tx<C: Console>(&mut self, rest: &str, console: &mut C) {
        let (slot_str, rest) = next_token(rest);
        let (hex, _) = next_token(rest);

        let Some(index) = parse_int(slot_str) else {
            console.write_line("ERR invalid slot\r\n");
            return;
        };
        let index = (index as usize).min(NUM_SLOTS - 1);

        if hex.len() % 2 != 0 || hex.len() / 2 > MAX_SLOT_PAYLOAD {
            console.write_line("ERR data invalid length\r\n");
            return;
        }

        let mut slot = Slot {
            priority: self.priorities[index],
            ..Slot::default()
        };
        let Some(size) = parse_hex_bytes(hex, &mut slot.data) else {
            console.write_line("ERR invalid data\r\n");
            return;
        };
        slot.size = size as u8;

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.set_tx_slot(index, slot);
        self.timeout_remaining = self.config.transmit_timeout_ms;

        console.write_line("OK\r\n");
    }

    fn command_pri<C: Console>(&mut self, rest: &str, console: &mut C) {
        let (slot_str, rest) = next_token(rest);
        let (pri_str, _) = next_token(rest);

        if slot_str.is_empty() || pri_str.is_empty() {
            console.write_line("ERR invalid priority\r\n");
            return;
        }
        let Some(index) = parse_int(slot_str) else {
            console.write_line("ERR invalid slot\r\n");
            return;
        };
        let index = (index as usize).min(NUM_SLOTS - 1);
        let Ok(priority) = u32::from_str_radix(pri_str, 16) else {
            console.write_line("ERR invalid priority\r\n");
            return;
        };

        self.priorities[index] = priority;

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let mut slot = *engine.tx_slot(index);
        slot.priority = priority;
        engine.set_tx_slot(index, slot);

        console.write_line("OK\r\n");
    }

    /// Zeroes every live slot priority; the link falls silent until the
    /// next `tx`.
    fn disable_transmit(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        for index in 0..NUM_SLOTS {
            let mut slot = *engine.tx_slot(index);
            if slot.priority != 0 {
                slot.priority = 0;
                engine.set_tx_slot(index, slot);
            }
        }
    }

    fn emit_slots<C: Console>(
        line: &mut String<LINE_LEN>,
        engine: &SlotRf<R>,
        console: &mut C,
        changed: u32,
    ) {
        if console.write_outstanding() {
            return;
        }

        line.clear();
        let _ = line.push_str("rcv");
        for index in 0..NUM_SLOTS {
            if changed & (0x3 << (index * 2)) == 0 {
                continue;
            }
            let slot = engine.rx_slot(index);
            let _ = write!(line, " {}:", index);
            for &byte in &slot.data[..usize::from(slot.size)] {
                let _ = write!(line, "{:02X}", byte);
            }
        }
        let error = engine.error();
        if error != 0 {
            let _ = write!(line, " E{:X}", error);
        }
        let _ = line.push_str("\r\n");
        console.write_line(line);
    }

    fn emit_channel<C: Console>(line: &mut String<LINE_LEN>, console: &mut C, channel: u8) {
        if console.write_outstanding() {
            return;
        }
        line.clear();
        let _ = write!(line, "chan {}\r\n", channel);
        console.write_line(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::recording::RecordingConsole;
    use crate::consts::SLOT_PERIOD_MS;
    use crate::radio::fake::FakeRadio;
    use crate::radio::Packet;

    fn manager() -> SlotManager<FakeRadio> {
        SlotManager::new(FakeRadio::ready_now(), SlotConfig::default())
    }

    fn run_ms(manager: &mut SlotManager<FakeRadio>, ms: u32) {
        for _ in 0..ms {
            manager.poll_millisecond();
        }
    }

    fn deliver(manager: &mut SlotManager<FakeRadio>, console: &mut RecordingConsole, frame: &[u8]) {
        let mut packet = Packet::new();
        let _ = packet.extend_from_slice(frame);
        if let Some(engine) = manager.engine.as_mut() {
            engine.radio_mut().rx = Some(packet);
        }
        manager.poll(console);
    }

    #[test]
    fn tx_installs_the_payload_with_the_shadow_priority() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();

        manager.command("tx 3 deadbeef", &mut console);
        assert_eq!(console.last(), "OK\r\n");

        let engine = manager.engine.as_ref().unwrap();
        let slot = engine.tx_slot(3);
        assert_eq!(slot.size, 4);
        assert_eq!(&slot.data[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(slot.priority, 0xFFFF_FFFF);
    }

    #[test]
    fn tx_then_tick_puts_the_slot_on_the_air() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();
        manager.command("tx 3 deadbeef", &mut console);

        run_ms(&mut manager, SLOT_PERIOD_MS);
        let engine = manager.engine.as_ref().unwrap();
        assert_eq!(
            &engine.radio().transmitted[0][..],
            &[0x34, 0xDE, 0xAD, 0xBE, 0xEF]
        );
    }

    #[test]
    fn tx_rejects_bad_hex() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();

        manager.command("tx 3 abc", &mut console);
        assert_eq!(console.last(), "ERR data invalid length\r\n");

        manager.command("tx 3 zz", &mut console);
        assert_eq!(console.last(), "ERR invalid data\r\n");

        // 16 bytes cannot ride in a 4-bit size field.
        manager.command("tx 3 00112233445566778899AABBCCDDEEFF", &mut console);
        assert_eq!(console.last(), "ERR data invalid length\r\n");

        let engine = manager.engine.as_ref().unwrap();
        assert_eq!(engine.tx_slot(3).size, 0, "no state change on error");
    }

    #[test]
    fn slot_indices_clamp_to_fifteen() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();
        manager.command("tx 99 aa", &mut console);
        assert_eq!(console.last(), "OK\r\n");
        let engine = manager.engine.as_ref().unwrap();
        assert_eq!(engine.tx_slot(15).size, 1);
    }

    #[test]
    fn pri_updates_shadow_and_live_slot() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();

        manager.command("tx 2 0102", &mut console);
        manager.command("pri 2 55555555", &mut console);
        assert_eq!(console.last(), "OK\r\n");

        assert_eq!(manager.priorities[2], 0x5555_5555);
        let engine = manager.engine.as_ref().unwrap();
        assert_eq!(engine.tx_slot(2).priority, 0x5555_5555);
    }

    #[test]
    fn pri_survives_watchdog_silence_and_rearms_on_tx() {
        let mut manager = manager();
        manager.set_config(SlotConfig {
            transmit_timeout_ms: 50,
            ..SlotConfig::default()
        });
        let mut console = RecordingConsole::new();

        manager.command("pri 1 00ff00ff", &mut console);
        manager.command("tx 1 aa", &mut console);

        run_ms(&mut manager, 49);
        assert_eq!(
            manager.engine.as_ref().unwrap().tx_slot(1).priority,
            0x00FF_00FF
        );
        run_ms(&mut manager, 1);
        assert_eq!(manager.engine.as_ref().unwrap().tx_slot(1).priority, 0);

        // The shadow survives: a new payload speaks again.
        manager.command("tx 1 bb", &mut console);
        assert_eq!(
            manager.engine.as_ref().unwrap().tx_slot(1).priority,
            0x00FF_00FF
        );
    }

    #[test]
    fn watchdog_zero_disables_the_timeout() {
        let mut manager = manager();
        manager.set_config(SlotConfig {
            transmit_timeout_ms: 0,
            ..SlotConfig::default()
        });
        let mut console = RecordingConsole::new();
        manager.command("tx 0 aa", &mut console);
        run_ms(&mut manager, 5000);
        assert_eq!(
            manager.engine.as_ref().unwrap().tx_slot(0).priority,
            0xFFFF_FFFF
        );
    }

    #[test]
    fn unknown_verbs_answer_err() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();
        manager.command("frob 1 2", &mut console);
        assert_eq!(console.last(), "ERR unknown command\r\n");
    }

    #[test]
    fn changed_slots_stream_as_rcv_lines() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();

        deliver(&mut manager, &mut console, &[0x34, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(console.last(), "rcv 3:DEADBEEF\r\n");

        // No change, no line.
        manager.poll(&mut console);
        assert_eq!(console.lines.len(), 1);
    }

    #[test]
    fn multiple_changed_slots_share_one_line() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();
        deliver(&mut manager, &mut console, &[0x11, 0x42, 0x72, 0xBE, 0xEF]);
        assert_eq!(console.last(), "rcv 1:42 7:BEEF\r\n");
    }

    #[test]
    fn decode_errors_ride_the_rcv_line() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();
        // One good slot, then a header that overruns the frame.
        deliver(&mut manager, &mut console, &[0x11, 0x42, 0x7F]);
        assert_eq!(console.last(), "rcv 1:42 E2\r\n");
    }

    #[test]
    fn busy_console_drops_the_report_not_the_data() {
        let mut manager = manager();
        let mut console = RecordingConsole::new();
        console.busy = true;
        deliver(&mut manager, &mut console, &[0x11, 0x42]);
        assert!(console.lines.is_empty());

        // The mirror still took the data.
        let engine = manager.engine.as_ref().unwrap();
        assert_eq!(engine.rx_slot(1).data[0], 0x42);
    }

    #[test]
    fn channel_hops_print_when_enabled() {
        let mut manager = manager();
        manager.set_config(SlotConfig {
            print_channels: true,
            ..SlotConfig::default()
        });
        let mut console = RecordingConsole::new();

        // The first poll reports the starting channel unless it happens
        // to be channel 0; every hop after that always reports.
        run_ms(&mut manager, 1);
        manager.poll(&mut console);
        let reported = console.lines.len();

        // Hop at 18 ms; schedule entries are distinct, so the next poll
        // must report.
        run_ms(&mut manager, 17);
        manager.poll(&mut console);
        assert_eq!(console.lines.len(), reported + 1);
        assert!(console.last().starts_with("chan "));
        assert!(console.last().ends_with("\r\n"));
    }

    #[test]
    fn set_config_rebuilds_the_radio() {
        let mut manager = manager();
        manager.set_config(SlotConfig {
            id: 0x1111_2222,
            ..SlotConfig::default()
        });
        let engine = manager.engine.as_ref().unwrap();
        assert_eq!(engine.radio().reconfigured, 1);
    }
}
