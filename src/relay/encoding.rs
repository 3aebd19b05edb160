//! USB relay command encodings
//!
//! The exact relay board model behind a HID/serial node is rarely known, so
//! every candidate device is tried with each encoding in turn. Earlier entries
//! match more common hardware. Checksum bytes are literal per encoding.

/// One ON/OFF byte-pair wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEncoding {
    pub name: &'static str,
    pub on: &'static [u8],
    pub off: &'static [u8],
}

/// Candidate encodings in priority order
pub const ENCODINGS: [CommandEncoding; 5] = [
    // LCUS frame: A0, channel, state, checksum
    CommandEncoding {
        name: "standard-4byte",
        on: &[0xA0, 0x01, 0x01, 0xA2],
        off: &[0xA0, 0x01, 0x00, 0xA1],
    },
    CommandEncoding {
        name: "3byte",
        on: &[0xA0, 0x01, 0x01],
        off: &[0xA0, 0x01, 0x00],
    },
    CommandEncoding {
        name: "lcus-1",
        on: &[0xFF, 0x01, 0x01],
        off: &[0xFF, 0x01, 0x00],
    },
    CommandEncoding {
        name: "single-byte",
        on: &[0x01],
        off: &[0x00],
    },
    // Modbus write-single-coil to address 0xFE, CRC16 included
    CommandEncoding {
        name: "modbus-8byte",
        on: &[0xFE, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x98, 0x35],
        off: &[0xFE, 0x05, 0x00, 0x00, 0x00, 0x00, 0xD9, 0xC5],
    },
];
