//! Wire-level constants for the combi-device simulator protocol.
//!
//! The simulator multiplexes six peripherals (cash drawer, keylock, line
//! display, MSR, keyboard and scanner) over one serial or TCP link. Every
//! frame sent by the device starts with a single tag byte followed by a
//! fixed-offset payload:
//!
//! ```text
//! S  O  -  0 0 0 0 0 0 0 0 0 0 0 0
//! │  │  │  └────── electronic key (12 hex chars)
//! │  │  └───────── lock position
//! │  └──────────── drawer state ('O' = open)
//! └─────────────── tag: status response
//! ```
//!
//! | Tag | Frame | Payload |
//! |-----|-------|---------|
//! | `D` | drawer | 1 byte state |
//! | `L` | lock | 1 byte position |
//! | `E` | electronic key | 12 hex chars |
//! | `B` | keyboard | row digit, column letter |
//! | `M` | MSR | 3-digit length, track data |
//! | `R` | scanner | label type, label |
//! | `S` | status | drawer, lock, electronic key |
//! | `C` | code page ack | 2-digit result |
//!
//! Commands sent to the device are short ASCII sequences (`SR`, `DO`,
//! `B1`, `B0`, `RE`, `RD`, `T...`, `C...`).

// ============================================================================
// Frame tags
// ============================================================================

/// Tag of the drawer state frame.
pub const TAG_DRAWER: u8 = b'D';

/// Tag of the lock position frame.
pub const TAG_LOCK: u8 = b'L';

/// Tag of the electronic key frame.
pub const TAG_EKEY: u8 = b'E';

/// Tag of the keyboard press frame.
pub const TAG_KEYBOARD: u8 = b'B';

/// Tag of the MSR track data frame.
pub const TAG_MSR: u8 = b'M';

/// Tag of the scanner label frame.
pub const TAG_SCANNER: u8 = b'R';

/// Tag of the status poll response.
pub const TAG_STATUS: u8 = b'S';

/// Tag of the display code page acknowledgement.
pub const TAG_DISPLAY: u8 = b'C';

/// Pseudo tag marking "no frame before the request timeout".
///
/// Also used as the expected response of responseless commands.
pub const NO_RESPONSE: u8 = 0;

// ============================================================================
// Frame layout
// ============================================================================

/// Total length of a drawer frame including the tag.
pub const DRAWER_FRAME_LEN: usize = 2;

/// Drawer byte value meaning "open".
pub const DRAWER_OPEN: u8 = b'O';

/// Total length of a lock frame including the tag.
pub const LOCK_FRAME_LEN: usize = 2;

/// Lock position reported before the first status frame.
pub const DEFAULT_LOCK_POSITION: u8 = b'-';

/// Lock position characters in index order.
pub const LOCK_POSITIONS: [u8; 8] = [b'-', b'0', b'1', b'2', b'X', b'Z', b'P', b'T'];

/// Number of hex characters in an electronic key value.
pub const EKEY_HEX_LEN: usize = 12;

/// Total length of an electronic key frame including the tag.
pub const EKEY_FRAME_LEN: usize = 1 + EKEY_HEX_LEN;

/// Total length of a keyboard frame including the tag.
pub const KEYBOARD_FRAME_LEN: usize = 3;

/// Number of keyboard rows (`'0'..='9'`).
pub const KEYBOARD_ROWS: usize = 10;

/// Number of keyboard columns (`'A'..='P'`).
pub const KEYBOARD_COLUMNS: usize = 16;

/// Length of the decimal length field following the MSR tag.
pub const MSR_LENGTH_DIGITS: usize = 3;

/// First byte of an MSR payload carrying track data.
pub const MSR_TRACK1_MARKER: u8 = b'1';

/// Marker preceding track 2 data.
pub const MSR_TRACK2_MARKER: u8 = b'2';

/// Marker preceding track 3 data.
pub const MSR_TRACK3_MARKER: u8 = b'3';

/// Start sentinel of track 1.
pub const MSR_TRACK1_START: u8 = b'&';

/// Start sentinel of tracks 2 and 3.
pub const MSR_TRACK23_START: u8 = b';';

/// End sentinel of every track.
pub const MSR_TRACK_END: u8 = b'?';

/// Scanner label type: UPC-A.
pub const LABEL_UPCA: u8 = b'A';

/// Scanner label type: UPC-E.
pub const LABEL_UPCE: u8 = b'E';

/// Scanner label type: EAN (8 or 13, see [`LABEL_EAN8_FLAG`]).
pub const LABEL_EAN: u8 = b'F';

/// Flag byte following [`LABEL_EAN`] that selects EAN-8.
pub const LABEL_EAN8_FLAG: u8 = b'F';

/// Bytes following the type byte of a UPC-A label.
pub const UPCA_LEN: usize = 12;

/// Bytes following the type byte of a UPC-E label.
pub const UPCE_LEN: usize = 7;

/// Bytes following the type byte of an EAN-8 label (flag included).
pub const EAN8_LEN: usize = 9;

/// Bytes following the type byte of an EAN-13 label.
pub const EAN13_LEN: usize = 13;

/// Total length of a status frame including the tag.
pub const STATUS_FRAME_LEN: usize = 15;

/// Offset of the drawer byte in a status frame.
pub const STATUS_DRAWER_POS: usize = 1;

/// Offset of the lock byte in a status frame.
pub const STATUS_LOCK_POS: usize = 2;

/// Offset of the electronic key in a status frame.
pub const STATUS_EKEY_POS: usize = 3;

/// Total length of a code page acknowledgement including the tag.
pub const DISPLAY_FRAME_LEN: usize = 3;

/// First result digit of a successful code page change.
pub const DISPLAY_SUCCESS: u8 = b'1';

// ============================================================================
// Commands
// ============================================================================

/// Status request.
pub const CMD_STATUS_REQUEST: &[u8] = b"SR";

/// Open the cash drawer.
pub const CMD_DRAWER_OPEN: &[u8] = b"DO";

/// Beeper on.
pub const CMD_BEEP_ON: &[u8] = b"B1";

/// Beeper off.
pub const CMD_BEEP_OFF: &[u8] = b"B0";

/// Scanner enable.
pub const CMD_SCANNER_ENABLE: &[u8] = b"RE";

/// Scanner disable.
pub const CMD_SCANNER_DISABLE: &[u8] = b"RD";

/// Prefix of a display line update.
pub const CMD_TEXT_PREFIX: u8 = b'T';

/// Prefix of a display code page change.
pub const CMD_CODE_PAGE_PREFIX: u8 = b'C';

// ============================================================================
// Line display geometry
// ============================================================================

/// Rows of the simulated line display.
pub const DISPLAY_ROWS: usize = 2;

/// Columns of the simulated line display.
pub const DISPLAY_COLUMNS: usize = 20;

/// Code pages selectable with the `C` command, in digit order.
pub const DISPLAY_CHARACTER_SETS: [u32; 4] = [437, 997, 998, 1252];

// ============================================================================
// Configuration defaults
// ============================================================================

/// Default serial baud rate.
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Default serial data bits.
pub const DEFAULT_DATABITS: u8 = 8;

/// Default serial stop bits.
pub const DEFAULT_STOPBITS: u8 = 2;

/// Default time in milliseconds between a command and the first response byte.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 500;

/// Default maximum gap in milliseconds between bytes of one frame.
pub const DEFAULT_CHARACTER_TIMEOUT_MS: u64 = 10;

/// Default minimum time in milliseconds between idle status requests.
pub const DEFAULT_POLL_DELAY_MS: u64 = 50;

/// Default number of retries before the device is considered offline.
pub const DEFAULT_MAX_RETRY: u32 = 2;
