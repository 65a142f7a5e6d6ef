//! Wire protocol: message shapes exchanged with the state server.
//!
//! Every frame is a JSON document carried in a WebSocket text message.
//! Outbound frames are commands and subscription control messages;
//! inbound frames are command replies and subscription pushes.

pub mod messages;
pub mod reply;
pub mod tree;

pub use messages::{InboundMessage, OutboundMessage};
pub use reply::CommandReply;
pub use tree::{TreeEntry, decode_tree};
