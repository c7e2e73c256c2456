mod delivery_client;

pub use delivery_client::*;
