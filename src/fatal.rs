//! The unrecoverable-error seam.
//!
//! Configuration mistakes are not worth limping past on a radio bridge:
//! a register that reads back wrong, an option the hardware cannot
//! express, or a command issued before the chip is in standby all leave
//! the link in a state no retry fixes. Every such condition funnels
//! through [`fatal`], which records the reason and halts by panicking.
//! On hardware the panic handler decides what a halt looks like; on the
//! host the test harness observes it with `#[should_panic]`.
//!
//! Transient radio conditions (retransmit exhaustion, RX overflow,
//! malformed frames) never come through here; they are counted and
//! reported by the components that see them.

/// Why the system is halting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fatal {
    /// A register write did not read back as written; the bus or the
    /// chip is not behaving.
    RegisterVerify(u8),
    /// The SPI bus itself reported a transfer error.
    SpiBus,
    /// The configured address length is outside 3..=5 bytes.
    UnsupportedAddressLength,
    /// The configured data rate is not one the chip provides.
    UnsupportedDataRate,
    /// The configured output power is not one the chip provides.
    UnsupportedOutputPower,
    /// A command needed the chip in standby, but configuration has not
    /// finished.
    NotInStandby,
    /// A transmit-side operation was invoked on a primary receiver.
    RoleMismatch,
    /// A slot was configured with more payload than its header can
    /// describe.
    OversizeSlot,
}

/// Halts the system with the given reason. Never returns.
pub fn fatal(reason: Fatal) -> ! {
    #[cfg(feature = "defmt")]
    defmt::error!("halt: {}", reason);
    #[cfg(feature = "log")]
    log::error!("halt: {:?}", reason);
    panic!("fatal: {:?}", reason);
}
