//! Slot wire framing.
//!
//! One radio frame carries zero or more encoded slots back to back. Each
//! slot costs one header byte, `(index << 4) | size`, followed by `size`
//! payload bytes; the whole frame never exceeds the 32-byte on-air
//! payload. An empty frame is legal and meaningful: it is still a slot
//! tick, and it gives the receiver something to acknowledge.
//!
//! Decoding walks the same layout in reverse and maintains a 2-bit
//! update counter per slot, packed into one 32-bit word. The counter
//! increments (wrapping) whenever a slot is written, so an observer can
//! diff the word against a snapshot to learn which slots changed, even
//! when the payload bytes happen to repeat.
//!
//! Because the size field is the header's low nibble, a slot can put at
//! most 15 bytes on the wire. Slot buffers hold 16; configuring a slot
//! with 16 bytes is rejected at the API boundary rather than truncated
//! here.

use crate::consts::{MAX_PACKET_LEN, NUM_SLOTS, SLOT_DATA_LEN};
use crate::radio::Packet;

/// One logical slot: what to send (or what was last received), and the
/// scheduling state that decides when.
///
/// `priority` is a 32-bit mask indexed by the transmitter's priority
/// phase: bit `k` set means the slot is eligible on frames whose phase
/// is `k`. All ones emits every frame, zero never emits. `age` counts
/// frames since the slot last made it onto the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Slot {
    /// Eligibility mask, one bit per priority phase.
    pub priority: u32,
    /// Bytes of `data` that are live.
    pub size: u8,
    /// Frames since this slot was last emitted (or received).
    pub age: u32,
    /// Payload storage.
    pub data: [u8; SLOT_DATA_LEN],
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            priority: 0,
            size: 0,
            age: 0,
            data: [0; SLOT_DATA_LEN],
        }
    }
}

/// A received frame that could not be fully decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// A slot header promised more payload than the frame had left.
    Truncated,
}

/// Appends one slot to a frame if it fits, returning whether it did.
///
/// The fit test is strictly `header + size < space left`; a slot that
/// would exactly fill the frame is skipped. Callers keep walking their
/// candidate list after a miss, so a smaller slot behind a large one
/// can still ride in the same frame.
pub fn append_slot(frame: &mut Packet, index: u8, slot: &Slot) -> bool {
    let needed = usize::from(slot.size) + 1;
    if needed >= MAX_PACKET_LEN - frame.len() {
        return false;
    }

    let _ = frame.push((index << 4) | slot.size);
    let _ = frame.extend_from_slice(&slot.data[..usize::from(slot.size)]);
    true
}

/// Decodes a received frame into the slot mirror, bumping the per-slot
/// update counters in `bitfield` for every slot written.
///
/// Slots already written before a truncated header are kept; the rest of
/// the frame is discarded and [`FrameError::Truncated`] is returned.
pub fn decode_frame(
    frame: &[u8],
    slots: &mut [Slot; NUM_SLOTS],
    bitfield: &mut u32,
) -> Result<(), FrameError> {
    let mut pos = 0;
    while pos < frame.len() {
        let header = frame[pos];
        pos += 1;

        let index = usize::from(header >> 4);
        let size = usize::from(header & 0x0F);
        if size > frame.len() - pos {
            return Err(FrameError::Truncated);
        }

        let slot = &mut slots[index];
        slot.age = 0;
        slot.size = size as u8;
        slot.data[..size].copy_from_slice(&frame[pos..pos + size]);
        *bitfield = bump_update_counter(*bitfield, index);

        pos += size;
    }
    Ok(())
}

/// Increments the 2-bit update counter for one slot, wrapping at four.
fn bump_update_counter(bitfield: u32, index: usize) -> u32 {
    let shift = index * 2;
    let next = ((bitfield >> shift) + 1) & 0x03;
    (bitfield & !(0x03 << shift)) | (next << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_with(priority: u32, payload: &[u8]) -> Slot {
        let mut slot = Slot {
            priority,
            size: payload.len() as u8,
            ..Slot::default()
        };
        slot.data[..payload.len()].copy_from_slice(payload);
        slot
    }

    #[test]
    fn single_slot_encodes_header_then_payload() {
        let mut frame = Packet::new();
        let slot = slot_with(0xFFFF_FFFF, &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(append_slot(&mut frame, 3, &slot));
        assert_eq!(&frame[..], &[0x34, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn slot_that_would_exactly_fill_the_frame_is_skipped() {
        let mut frame = Packet::new();
        let _ = frame.resize_default(21);

        // 11 bytes needed, 11 left: strictly-less fails.
        let exact = slot_with(0, &[0u8; 10]);
        assert!(!append_slot(&mut frame, 0, &exact));
        assert_eq!(frame.len(), 21);

        // One byte smaller rides along.
        let smaller = slot_with(0, &[0u8; 9]);
        assert!(append_slot(&mut frame, 0, &smaller));
        assert_eq!(frame.len(), 31);
    }

    #[test]
    fn round_trip_restores_payloads_in_their_slots() {
        let mut frame = Packet::new();
        assert!(append_slot(&mut frame, 3, &slot_with(0, &[0xDE, 0xAD, 0xBE, 0xEF])));
        assert!(append_slot(&mut frame, 0, &slot_with(0, &[0x01])));
        assert!(append_slot(&mut frame, 15, &slot_with(0, &[])));

        let mut slots = [Slot::default(); NUM_SLOTS];
        let mut bitfield = 0;
        assert_eq!(decode_frame(&frame, &mut slots, &mut bitfield), Ok(()));

        assert_eq!(slots[3].size, 4);
        assert_eq!(&slots[3].data[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(slots[0].size, 1);
        assert_eq!(slots[0].data[0], 0x01);
        assert_eq!(slots[15].size, 0);

        // Exactly the three written slots show an update.
        assert_eq!(bitfield, (1 << 6) | (1 << 0) | (1 << 30));
    }

    #[test]
    fn empty_frame_decodes_to_nothing() {
        let mut slots = [Slot::default(); NUM_SLOTS];
        let mut bitfield = 0;
        assert_eq!(decode_frame(&[], &mut slots, &mut bitfield), Ok(()));
        assert_eq!(bitfield, 0);
    }

    #[test]
    fn truncated_header_keeps_earlier_slots_and_reports() {
        let mut frame = Packet::new();
        assert!(append_slot(&mut frame, 2, &slot_with(0, &[0x11, 0x22])));
        // Header claims 5 bytes, only 1 follows.
        let _ = frame.push(0x45);
        let _ = frame.push(0x33);

        let mut slots = [Slot::default(); NUM_SLOTS];
        let mut bitfield = 0;
        assert_eq!(
            decode_frame(&frame, &mut slots, &mut bitfield),
            Err(FrameError::Truncated)
        );

        assert_eq!(slots[2].size, 2);
        assert_eq!(&slots[2].data[..2], &[0x11, 0x22]);
        assert_eq!(slots[4].size, 0, "truncated slot is discarded");
        assert_eq!(bitfield, 1 << 4, "only the good slot counts");
    }

    #[test]
    fn decode_zeroes_the_age_of_written_slots() {
        let mut slots = [Slot::default(); NUM_SLOTS];
        slots[7].age = 42;

        let mut frame = Packet::new();
        assert!(append_slot(&mut frame, 7, &slot_with(0, &[0xAB])));
        let mut bitfield = 0;
        assert_eq!(decode_frame(&frame, &mut slots, &mut bitfield), Ok(()));
        assert_eq!(slots[7].age, 0);
    }

    #[test]
    fn update_counter_wraps_after_four_writes() {
        let mut bitfield = 0u32;
        for expected in [1u32, 2, 3, 0] {
            bitfield = bump_update_counter(bitfield, 5);
            assert_eq!((bitfield >> 10) & 0x03, expected);
        }
        assert_eq!(bitfield & !(0x03 << 10), 0, "other slots untouched");
    }
}
