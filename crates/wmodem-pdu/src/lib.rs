//! # wmodem – SMS PDU codec
//!
//! Binary SMS handling for the modem manager:
//!
//! - **Decoding** – SMS-DELIVER and SMS-SUBMIT PDUs as listed by
//!   `AT+CMGL` in PDU mode: addresses, service-centre timestamps, the
//!   packed 7-bit default alphabet, UCS2 and user-data headers
//! - **Encoding** – UCS2 SMS-SUBMIT PDUs for `AT+CMGS`, split into
//!   concatenated parts when the text does not fit one message
//! - **Reassembly** – merging the parts of a multi-part message from a
//!   single listing

pub mod pdu;
