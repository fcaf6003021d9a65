//! Protocol module - the transaction wire contract
//!
//! Every request message starts with an interface token:
//! - 4 bytes strict-mode header
//! - the descriptor as a length-prefixed UTF-16 string
//!
//! followed by the opcode's arguments in the order fixed by the schema
//! table. Replies carry only their declared fields.

mod acoustics;
mod handle;
mod opcode;
mod parcel;
mod request;
mod status;

pub use acoustics::*;
pub use handle::*;
pub use opcode::*;
pub use parcel::*;
pub use request::*;
pub use status::*;

/// Contract identifier carried by every transaction
pub const INTERFACE_DESCRIPTOR: &str = "android.media.IMediaPlayerService";

/// Default port for the TCP transport
pub const DEFAULT_PORT: u16 = 24810;
