use crate::prelude::*;

use chrono::NaiveDateTime;

use crate::growatt::packet::{ConfigId, ConfigResponse, DeviceTime};

/// Largest tolerated difference between a device clock and ours.
pub const MAX_DRIFT_SECS: i64 = 60;

pub struct TimeSync;

impl TimeSync {
    /// Returns a Date push when the clock a device announced is more than
    /// MAX_DRIFT_SECS away from the reference clock. An unparseable
    /// device clock is corrected too.
    pub fn correction(
        wifi_serial: Serial,
        reported: &DeviceTime,
        now: NaiveDateTime,
    ) -> Option<ConfigResponse> {
        match reported.to_naive() {
            Some(device) if (device - now).num_seconds().abs() <= MAX_DRIFT_SECS => None,
            Some(device) => {
                info!(
                    "{}: device clock {} drifted from {}, pushing correction",
                    wifi_serial, device, now
                );
                Some(Self::set_clock(wifi_serial, now))
            }
            None => {
                warn!("{}: device clock unparseable, pushing correction", wifi_serial);
                Some(Self::set_clock(wifi_serial, now))
            }
        }
    }

    fn set_clock(wifi_serial: Serial, now: NaiveDateTime) -> ConfigResponse {
        ConfigResponse {
            wifi_serial,
            config_id: ConfigId::Date.into(),
            config_value: now.format("%Y-%m-%d %H:%M:%S").to_string().into_bytes(),
        }
    }
}
