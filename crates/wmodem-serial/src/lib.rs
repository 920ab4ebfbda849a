//! # wmodem – Serial modems
//!
//! GSM/LTE modems attached as serial devices:
//!
//! - **Transport** – byte-stream trait with a `serialport` backend and an
//!   in-memory simulated one
//! - **Engine** – AT command/response framing with URC demultiplexing on a
//!   single reader task
//! - **Device** – typed operations: identity, signal, SMS list/send/delete
//! - **Registry** – port discovery, device lifecycle, event lines and
//!   inbound message forwarding

pub mod serial;
