//! The slot protocol engine.
//!
//! [`SlotRf`] owns one packet radio and turns it into a slotted link:
//! every 20 ms the transmitter packs eligible slots into one frame and
//! sends it; receivers follow the same channel schedule and decode
//! frames into a slot mirror. Both sides derive the schedule and the
//! on-air address from the shared identifier alone.
//!
//! ## Transmit side
//!
//! A slot is eligible for a frame when its priority mask has the bit for
//! the current priority phase set; the phase steps through 0..16, one
//! per frame. Eligible slots are packed oldest-first (ties broken by
//! index) until the frame is full, and packed slots have their age
//! reset. Two milliseconds before each frame the engine hops to the
//! next channel so the synthesizer is settled when the frame goes out.
//! Frames are sent even when empty: an empty frame still paces the
//! receiver and collects its acknowledge.
//!
//! ## Receive side
//!
//! A receiver starts out `Synchronizing`: parked on one schedule entry,
//! waiting up to 20 slot periods for anything addressed to it, then
//! moving to the next entry. The first received frame locks it to the
//! transmitter's cadence. While `Locked` it hops halfway through each
//! slot period, right between two expected frames, and loads its own
//! scheduled slots as an acknowledge payload, the back channel. Five
//! consecutive silent periods drop it back to `Synchronizing`.
//!
//! The engine is driven the same way as the radio: `poll` whenever the
//! loop spins, `poll_millisecond` once per millisecond tick. The slot
//! clock only runs once the radio reports ready, so nothing commands
//! the chip before it is in standby.

use heapless::Vec;

use crate::consts::*;
use crate::frame::{append_slot, decode_frame, Slot};
use crate::pairing::{on_air_address, ChannelTable, Lcg};
use crate::radio::{Packet, PacketRadio, RadioOptions};

/// Link-level configuration shared by both endpoint roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOptions {
    /// Primary transmitter when true, primary receiver when false.
    pub ptx: bool,
    /// The 32-bit pairing identifier both endpoints share.
    pub id: u32,
    /// Air data rate in bits per second.
    pub data_rate: u32,
    /// Output power in dBm.
    pub output_power: i8,
    /// Hardware auto-retransmit attempts; the protocol itself re-sends
    /// every slot period, so this normally stays 0.
    pub auto_retransmit_count: u8,
}

impl Default for SlotOptions {
    fn default() -> Self {
        SlotOptions {
            ptx: true,
            id: 0x3045,
            data_rate: 1_000_000,
            output_power: 0,
            auto_retransmit_count: 0,
        }
    }
}

impl SlotOptions {
    /// The radio configuration this link needs: five-byte derived
    /// address, dynamic payloads, two-byte CRC, auto-acknowledge on for
    /// the reply path.
    pub fn radio_options(&self) -> RadioOptions {
        RadioOptions {
            ptx: self.ptx,
            address_length: 5,
            id: on_air_address(self.id),
            dynamic_payload_length: true,
            enable_crc: true,
            crc_length: 2,
            auto_retransmit_count: self.auto_retransmit_count,
            auto_retransmit_delay_us: 1000,
            automatic_acknowledgment: true,
            initial_channel: 0,
            data_rate: self.data_rate,
            output_power: self.output_power,
        }
    }
}

/// Where a receiver stands relative to the transmitter's cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveMode {
    /// Hunting for the transmitter, one schedule entry at a time.
    Synchronizing,
    /// Following the hop schedule inside a narrow timing window.
    Locked,
}

/// The slot protocol engine. Owns the radio for the life of the link.
pub struct SlotRf<R> {
    nrf: R,
    options: SlotOptions,
    channels: ChannelTable,
    channel_index: usize,
    started: bool,
    slot_timer: u32,
    priority_phase: u8,
    rx_miss_count: u32,
    receive_mode: ReceiveMode,
    slot_bitfield: u32,
    tx_slots: [Slot; NUM_SLOTS],
    rx_slots: [Slot; NUM_SLOTS],
    tx_packet: Packet,
    rx_packet: Packet,
    error_flags: u32,
}

impl<R: PacketRadio> SlotRf<R> {
    /// Binds the engine to a radio configured per
    /// [`SlotOptions::radio_options`]. Derives the hop schedule and,
    /// for a receiver, the schedule entry to start hunting on.
    pub fn new(nrf: R, options: SlotOptions) -> Self {
        let mut prn = Lcg::new(options.id);
        let channels = ChannelTable::generate(&mut prn);
        let channel_index = if options.ptx {
            0
        } else {
            // "Random" start entry: one more draw from the pairing
            // generator, so it needs no entropy source.
            (prn.next() % NUM_CHANNELS as u32) as usize
        };

        SlotRf {
            nrf,
            options,
            channels,
            channel_index,
            started: false,
            slot_timer: SLOT_PERIOD_MS,
            priority_phase: 0,
            rx_miss_count: 0,
            receive_mode: ReceiveMode::Synchronizing,
            slot_bitfield: 0,
            tx_slots: [Slot::default(); NUM_SLOTS],
            rx_slots: [Slot::default(); NUM_SLOTS],
            tx_packet: Packet::new(),
            rx_packet: Packet::new(),
            error_flags: 0,
        }
    }

    /// Services the radio and decodes anything it delivered. For a
    /// receiver, a delivery also refreshes the lock.
    pub fn poll(&mut self) {
        self.nrf.poll();

        if !self.nrf.is_data_ready() {
            return;
        }
        if !self.nrf.read(&mut self.rx_packet) {
            return;
        }

        if !self.options.ptx {
            if self.receive_mode == ReceiveMode::Synchronizing {
                #[cfg(feature = "log")]
                log::info!("locked on channel {}", self.channels.get(self.channel_index));
            }
            self.receive_mode = ReceiveMode::Locked;
            self.slot_timer = SLOT_PERIOD_MS;
            self.rx_miss_count = 0;
        }

        for slot in &mut self.rx_slots {
            slot.age = slot.age.wrapping_add(1);
        }
        if decode_frame(&self.rx_packet, &mut self.rx_slots, &mut self.slot_bitfield).is_err() {
            self.error_flags |= ERROR_MALFORMED_FRAME;
            #[cfg(feature = "log")]
            log::warn!("malformed frame dropped");
        }
    }

    /// Advances the slot clock; call once per millisecond. Runs the
    /// radio's own millisecond work first and holds the slot clock
    /// until the radio is ready.
    pub fn poll_millisecond(&mut self) {
        self.nrf.poll_millisecond();
        if !self.nrf.ready() {
            return;
        }
        if !self.started {
            self.started = true;
            self.nrf
                .select_rf_channel(self.channels.get(self.channel_index));
        }

        self.slot_timer -= 1;

        if self.options.ptx {
            if self.slot_timer == 0 {
                self.transmit_cycle();
                self.slot_timer = SLOT_PERIOD_MS;
            } else if self.slot_timer == TX_HOP_LEAD_MS {
                // Hop early so the synthesizer settles before the frame.
                self.switch_channel();
            }
        } else if self.slot_timer == 0 {
            self.slot_timer = SLOT_PERIOD_MS;
            self.rx_miss_count += 1;

            match self.receive_mode {
                ReceiveMode::Synchronizing => {
                    if self.rx_miss_count >= SYNC_DWELL_PERIODS {
                        self.switch_channel();
                        self.rx_miss_count = 0;
                    }
                }
                ReceiveMode::Locked => {
                    if self.rx_miss_count >= LOCK_MISS_LIMIT {
                        self.receive_mode = ReceiveMode::Synchronizing;
                        self.rx_miss_count = 0;
                        #[cfg(feature = "log")]
                        log::warn!("lock lost, resynchronizing");
                    }
                }
            }
        } else if self.slot_timer == SLOT_PERIOD_MS / 2
            && self.receive_mode == ReceiveMode::Locked
        {
            // Halfway between two expected frames: hop now, and stage
            // our own slots on the acknowledge of the next one.
            self.switch_channel();
            self.reply_cycle();
        }
    }

    fn switch_channel(&mut self) {
        self.channel_index = (self.channel_index + 1) % NUM_CHANNELS;
        self.nrf
            .select_rf_channel(self.channels.get(self.channel_index));
    }

    fn transmit_cycle(&mut self) {
        self.prepare_tx_packet();
        self.nrf.transmit(&self.tx_packet);
    }

    fn reply_cycle(&mut self) {
        self.prepare_tx_packet();
        // An acknowledge with nothing in it adds nothing over the
        // hardware ack.
        if !self.tx_packet.is_empty() {
            self.nrf.queue_ack(&self.tx_packet);
        }
    }

    /// Builds the next frame: age everything, take the slots whose
    /// priority mask covers this phase, oldest first, and pack until
    /// the frame is full.
    fn prepare_tx_packet(&mut self) {
        for slot in &mut self.tx_slots {
            slot.age = slot.age.wrapping_add(1);
        }

        let mask = 1u32 << self.priority_phase;
        let mut enabled: Vec<u8, NUM_SLOTS> = Vec::new();
        for (index, slot) in self.tx_slots.iter().enumerate() {
            if slot.priority & mask != 0 {
                let _ = enabled.push(index as u8);
            }
        }

        let slots = &self.tx_slots;
        enabled.sort_unstable_by(|&a, &b| {
            let by_age = slots[usize::from(b)].age.cmp(&slots[usize::from(a)].age);
            by_age.then(a.cmp(&b))
        });

        self.tx_packet.clear();
        for &index in &enabled {
            if append_slot(&mut self.tx_packet, index, &self.tx_slots[usize::from(index)]) {
                self.tx_slots[usize::from(index)].age = 0;
            }
        }

        self.priority_phase = (self.priority_phase + 1) % PRIORITY_PHASES;
    }

    /// Installs a slot definition; it takes effect on the next frame.
    /// A payload the header cannot describe is a configuration error.
    pub fn set_tx_slot(&mut self, index: usize, slot: Slot) {
        if usize::from(slot.size) > MAX_SLOT_PAYLOAD {
            crate::fatal::fatal(crate::fatal::Fatal::OversizeSlot);
        }
        self.tx_slots[index] = slot;
    }

    /// The current definition of a transmit slot.
    pub fn tx_slot(&self, index: usize) -> &Slot {
        &self.tx_slots[index]
    }

    /// The last received contents of a slot.
    pub fn rx_slot(&self, index: usize) -> &Slot {
        &self.rx_slots[index]
    }

    /// The packed per-slot update counters; diff against a snapshot to
    /// see which slots changed.
    pub fn slot_bitfield(&self) -> u32 {
        self.slot_bitfield
    }

    /// The channel number currently tuned (or about to be).
    pub fn channel(&self) -> u8 {
        self.channels.get(self.channel_index)
    }

    /// Radio and protocol error flags, `ERROR_*` bits.
    pub fn error(&self) -> u32 {
        self.nrf.error() | self.error_flags
    }

    /// True once the radio finished configuring.
    pub fn ready(&self) -> bool {
        self.nrf.ready()
    }

    /// Receiver synchronization state.
    pub fn receive_mode(&self) -> ReceiveMode {
        self.receive_mode
    }

    /// Borrows the owned radio, e.g. for status reporting.
    pub fn radio(&self) -> &R {
        &self.nrf
    }

    /// Mutably borrows the owned radio.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.nrf
    }

    /// Unbinds and returns the radio, consuming the engine.
    pub fn release(self) -> R {
        self.nrf
    }
}
