mod json_file_snapshot_store;
mod json_file_zone_directory;

pub use json_file_snapshot_store::*;
pub use json_file_zone_directory::*;
