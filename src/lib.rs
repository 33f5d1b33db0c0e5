//! # slotlink
//!
//! A TDMA-style slotted wireless link over nRF24L01+ compatible 2.4 GHz
//! packet radios, for `no_std` firmware.
//!
//! One transmitter and its receivers share nothing but a 32-bit
//! identifier. From it both sides derive the 40-bit on-air address and
//! a pseudorandom 23-channel hop schedule; no pairing handshake ever
//! crosses the air. On top of the radio's per-packet transport, the
//! link multiplexes up to 16 logical "slots" of up to 15 bytes each
//! into one 32-byte frame per 20 ms slot period, each slot emitted on a
//! caller-controlled priority/duty pattern. Receivers follow the hop
//! schedule, lock onto the transmitter's cadence, and carry their own
//! slots back on acknowledge payloads.
//!
//! Everything is driven from a single cooperative loop: call `poll`
//! whenever the loop spins and `poll_millisecond` on each millisecond
//! edge. No interrupt runs application logic; the radio's IRQ line is
//! sampled as a level.
//!
//! ## Crate features
//! | Feature | Description |
//! |---------|-------------|
//! | `std`   | Disables `#![no_std]` support |
//! | `defmt` | Derives `defmt::Format` on public types and logs halts |
//! | `log`   | Emits state transitions through the `log` facade |
//!
//! ## Layout
//!
//! - [`radio`]: the nRF24L01+ driver (bring-up state machine, verified
//!   register configuration, IRQ servicing, packet TX/RX).
//! - [`protocol`]: the slot engine (scheduler, hop schedule, receiver
//!   lock).
//! - [`manager`] / [`raw`]: console bindings for the slot link and for
//!   the bare driver.
//! - [`pairing`], [`frame`], [`timer`], [`console`], [`consts`],
//!   [`fatal`]: the parts those are built from.
//!
//! ## Usage
//!
//! ```ignore
//! use slotlink::{Nrf24l01, SlotConfig, SlotManager};
//!
//! let config = SlotConfig::default();
//! let radio = Nrf24l01::new(
//!     spi, cs, ce, irq, timer,
//!     config.slot_options().radio_options(),
//! );
//! let mut manager = SlotManager::new(radio, config);
//!
//! let mut last_ms = 0;
//! loop {
//!     usb.poll();
//!     manager.poll(&mut console);
//!     let now = timer.read_ms();
//!     if now != last_ms {
//!         manager.poll_millisecond();
//!         last_ms = now;
//!     }
//! }
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]

pub mod console;
pub mod consts;
pub mod fatal;
pub mod frame;
pub mod manager;
pub mod pairing;
pub mod protocol;
pub mod radio;
pub mod raw;
pub mod timer;

pub use console::Console;
pub use frame::Slot;
pub use manager::{SlotConfig, SlotManager};
pub use protocol::{ReceiveMode, SlotOptions, SlotRf};
pub use radio::{Nrf24l01, Packet, PacketRadio, RadioOptions, RadioState};
pub use raw::RawManager;
pub use timer::Clock;
