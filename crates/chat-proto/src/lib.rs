//! # chat-proto
//!
//! Wire protocol for the chat gateway: op codes, close codes, the message
//! envelope, client/server payloads, dispatch event names, and the payload
//! encoding.

pub mod close_codes;
pub mod encoding;
pub mod events;
pub mod messages;
pub mod opcodes;
pub mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use encoding::{EncodedFrame, Encoding, ProtocolError, ProtocolResult};
pub use events::{DispatchEvent, EventKind};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    Activity, GuildStub, HelloPayload, IdentifyPayload, IdentifyProperties, MemberChunkData,
    ReadyData, ReadyUser, RequestMembersPayload, ResumePayload, Status, StatusUpdatePayload,
};

/// Gateway protocol version sent in the Identify payload and the URL query
pub const GATEWAY_VERSION: u64 = 6;
