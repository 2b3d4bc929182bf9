//! Wire protocol for the kiln serial link.
//!
//! Both directions of the link carry newline-framed JSON objects. This crate
//! defines the outbound command shapes and the classification of inbound
//! messages (status reports, command acknowledgments, free-form diagnostic
//! data). It performs no I/O; the hardware link in kilnd owns the port.

pub mod command;
pub mod inbound;

pub use command::Command;
pub use inbound::{decode_line, InboundMessage, MalformedLine, MessageKind};
