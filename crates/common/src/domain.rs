mod clock;
mod envelope;
mod event;
mod registry;
mod result;
mod snapshot;

pub use clock::*;
pub use envelope::*;
pub use event::*;
pub use registry::*;
pub use result::*;
pub use snapshot::*;
