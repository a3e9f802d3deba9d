//! The compact binary format.
//!
//! Header: 4-byte magic `LBSR`, u32 format-version, u32 save-version.
//! Everything is little-endian. Payloads are shape-driven: the byte stream
//! carries no per-field framing, so reader and writer must walk identical
//! shapes, which the registered component set guarantees.

pub(crate) mod reader;
pub(crate) mod writer;

pub const MAGIC: [u8; 4] = *b"LBSR";
pub const FORMAT_VERSION: u32 = 1;
