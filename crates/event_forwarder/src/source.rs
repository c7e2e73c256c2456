mod event_bus;
mod json_lines_reader;

pub use event_bus::*;
pub use json_lines_reader::*;
