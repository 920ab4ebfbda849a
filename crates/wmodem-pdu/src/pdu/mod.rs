//! PDU crate: sub-modules.

pub mod error;
pub mod types;
pub mod semi_octet;
pub mod gsm7;
pub mod ucs2;
pub mod udh;
pub mod decoder;
pub mod encoder;
pub mod concat;

// Re-export top-level items for convenience.
pub use concat::reassemble;
pub use decoder::{decode_bytes, decode_pdu};
pub use encoder::{encode_submit, encode_submit_concatenated, EncodedPdu};
pub use error::{PduError, PduErrorKind, PduResult};
pub use types::*;
