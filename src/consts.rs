//! Constants shared across the radio driver and the slot protocol.
//!
//! The first half of this module is the nRF24L01+ register map as the
//! driver uses it: register addresses, SPI command opcodes, and the bit
//! layout of the CONFIG/STATUS/FEATURE registers. The second half is the
//! slot protocol's framing and timing parameters.
//!
//! ## Key Concepts
//!
//! - **Registers**: one byte of address space per register; written with
//!   the `W_REGISTER` opcode base, read with `R_REGISTER`.
//! - **Commands**: fixed opcodes for payload and FIFO operations.
//! - **Slots**: up to 16 logical channels multiplexed into one 32-byte
//!   radio frame, one frame per 20 ms slot period.
//! - **Hop schedule**: 23 channels visited in a fixed order, switching
//!   shortly before each frame so the synthesizer can settle.

/// CONFIG register: interrupt masks, CRC control, power and role bits.
pub const REG_CONFIG: u8 = 0x00;
/// EN_AA register: per-pipe auto-acknowledge enable.
pub const REG_EN_AA: u8 = 0x01;
/// EN_RXADDR register: per-pipe receive enable.
pub const REG_EN_RXADDR: u8 = 0x02;
/// SETUP_AW register: on-air address width.
pub const REG_SETUP_AW: u8 = 0x03;
/// SETUP_RETR register: auto-retransmit delay and count.
pub const REG_SETUP_RETR: u8 = 0x04;
/// RF_CH register: RF channel number, 0..=124.
pub const REG_RF_CH: u8 = 0x05;
/// RF_SETUP register: data rate and output power.
pub const REG_RF_SETUP: u8 = 0x06;
/// STATUS register: latched interrupt causes, cleared by writing them back.
pub const REG_STATUS: u8 = 0x07;
/// RX_ADDR_P0 register: pipe 0 receive address.
pub const REG_RX_ADDR_P0: u8 = 0x0A;
/// TX_ADDR register: transmit address.
pub const REG_TX_ADDR: u8 = 0x10;
/// DYNPD register: per-pipe dynamic payload length enable.
pub const REG_DYNPD: u8 = 0x1C;
/// FEATURE register: dynamic payload / ack payload feature switches.
pub const REG_FEATURE: u8 = 0x1D;

/// Opcode base for register reads; the register address is added in.
pub const CMD_R_REGISTER: u8 = 0x00;
/// Opcode base for register writes; the register address is added in.
pub const CMD_W_REGISTER: u8 = 0x20;
/// Read the width of the payload at the head of the RX FIFO.
pub const CMD_R_RX_PL_WID: u8 = 0x60;
/// Read the payload at the head of the RX FIFO.
pub const CMD_R_RX_PAYLOAD: u8 = 0x61;
/// Load a payload into the TX FIFO.
pub const CMD_W_TX_PAYLOAD: u8 = 0xA0;
/// Load an acknowledge payload for pipe 0.
pub const CMD_W_ACK_PAYLOAD_P0: u8 = 0xA8;
/// Discard everything in the TX FIFO.
pub const CMD_FLUSH_TX: u8 = 0xE1;
/// No operation; clocks out the STATUS register.
pub const CMD_NOP: u8 = 0xFF;

/// STATUS: a received payload is ready in the RX FIFO.
pub const STATUS_RX_DR: u8 = 1 << 6;
/// STATUS: the last transmitted payload left the air (and was acked, if
/// auto-acknowledge is on).
pub const STATUS_TX_DS: u8 = 1 << 5;
/// STATUS: the auto-retransmit count was exhausted without an ack.
pub const STATUS_MAX_RT: u8 = 1 << 4;
/// All latched interrupt bits; writing these back clears them atomically.
pub const STATUS_IRQ_MASK: u8 = 0x70;

/// CONFIG: enable the on-air CRC.
pub const CONFIG_EN_CRC: u8 = 1 << 3;
/// CONFIG: two-byte CRC instead of one.
pub const CONFIG_CRCO: u8 = 1 << 2;
/// CONFIG: leave power-down.
pub const CONFIG_PWR_UP: u8 = 1 << 1;
/// CONFIG: primary receiver role.
pub const CONFIG_PRIM_RX: u8 = 1 << 0;

/// FEATURE: enable dynamic payload length.
pub const FEATURE_EN_DPL: u8 = 1 << 2;
/// FEATURE: enable payloads on acknowledge frames.
pub const FEATURE_EN_ACK_PAY: u8 = 1 << 1;
/// FEATURE: enable the W_TX_PAYLOAD_NOACK command.
pub const FEATURE_EN_DYN_ACK: u8 = 1 << 0;

/// Largest on-air payload the packet engine carries.
pub const MAX_PACKET_LEN: usize = 32;
/// Highest RF channel number the synthesizer accepts.
pub const MAX_CHANNEL: u8 = 124;

/// The chip is not listening on SPI for the first stretch after power is
/// applied; commands are held off until this many milliseconds have passed.
pub const POWER_ON_RESET_MS: u32 = 150;
/// Settling time between writing CONFIG and entering standby.
pub const STANDBY_SETTLE_MS: u32 = 2;
/// Minimum CE pulse width to start a transmission, in microseconds.
pub const CE_PULSE_US: u32 = 10;
/// Wait after chip select falls before the first clock edge. The chip
/// needs 38 ns; one microsecond is the shortest wait the timer provides.
pub const CS_SETUP_US: u32 = 1;

/// Number of logical slots multiplexed onto the link.
pub const NUM_SLOTS: usize = 16;
/// Bytes of payload storage per slot.
pub const SLOT_DATA_LEN: usize = 16;
/// Largest slot payload the one-byte header can describe: the size lives
/// in the header's low nibble.
pub const MAX_SLOT_PAYLOAD: usize = 15;
/// Length of one slot period in milliseconds; one frame per period.
pub const SLOT_PERIOD_MS: u32 = 20;
/// Number of priority windows a slot's priority mask indexes into.
pub const PRIORITY_PHASES: u8 = 16;
/// Entries in the hop schedule.
pub const NUM_CHANNELS: usize = 23;
/// Milliseconds of slot time left when the transmitter hops, giving the
/// synthesizer time to settle before the frame goes out.
pub const TX_HOP_LEAD_MS: u32 = 2;
/// Slot periods a synchronizing receiver dwells on one channel.
pub const SYNC_DWELL_PERIODS: u32 = 20;
/// Consecutive missed slot periods before a locked receiver gives up.
pub const LOCK_MISS_LIMIT: u32 = 5;

/// Error flag: a received packet arrived before the previous one was read.
pub const ERROR_RX_OVERFLOW: u32 = 1 << 0;
/// Error flag: a received frame carried a slot header whose size ran past
/// the end of the frame.
pub const ERROR_MALFORMED_FRAME: u32 = 1 << 1;
