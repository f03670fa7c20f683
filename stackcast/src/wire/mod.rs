//! Wire protocol
//!
//! Every connection carries, in order:
//!
//! ```text
//! server ──▶ viewer:  GREETING ─ SOURCE_KIND ─ SNAPSHOT ─ SNAPSHOT ─ ...
//! ```
//!
//! Framing lives in [`frame`], typed payloads in [`message`]. Viewers never
//! send anything; the server only reads from them to notice disconnects.

pub mod frame;
pub mod message;

pub use frame::{
    decode, encode, read_frame, read_frame_blocking, write_encoded, write_frame_blocking, Frame,
};
pub use message::{Greeting, Message};
