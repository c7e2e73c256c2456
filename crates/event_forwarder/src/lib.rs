pub mod domain;
pub mod event_forwarder;
pub mod http;
pub mod source;
pub mod storage;

pub use domain::*;
pub use event_forwarder::*;
pub use http::*;
pub use source::*;
pub use storage::*;
