/// DAAP request handling: framing, classification and response building
pub mod processor;
pub mod request;
pub mod response;

pub use processor::ServerInfo;
pub use request::{ByteRange, DaapRequest, Meta, Query, RequestCodec, RequestKind};
pub use response::Response;
