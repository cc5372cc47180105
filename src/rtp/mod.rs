//! RTP header codec, payload-type registry, and the packet-domain
//! validation/population stages.

mod format;
mod header;
mod parser;
mod populator;
mod validator;

pub use format::{Format, FormatMap, PAYLOAD_TYPE_L16_MONO, PAYLOAD_TYPE_L16_STEREO};
pub use header::{RtpHeader, RTP_HEADER_SIZE, RTP_VERSION};
pub use parser::Parser;
pub use populator::Populator;
pub use validator::{Validator, ValidatorConfig};

#[cfg(test)]
pub use test_support::{test_packet, test_packet_with_duration, test_packet_with_flags};
