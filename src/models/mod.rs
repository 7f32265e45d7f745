pub mod frame;
pub mod payload;

pub use frame::{Frame, FrameBuf};
pub use payload::{DecodedPayload, MARKER_LEN, Outcome, SymbolResult};
