pub mod config_sync;
pub mod timesync;
