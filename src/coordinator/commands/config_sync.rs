use crate::prelude::*;

use crate::growatt::packet::{ConfigDescription, ConfigResponse, QueryRequest};

pub struct ConfigSync;

impl ConfigSync {
    /// Compare a reported config value against the expected one; a
    /// mismatch produces a corrective push. Ids without an expectation
    /// produce nothing.
    pub fn correction(
        report: &QueryRequest,
        enforce: &config::Enforcements,
    ) -> Option<ConfigResponse> {
        let expected = enforce.expected(report.config_id)?;

        if report.config_value == expected.as_bytes() {
            return None;
        }

        info!(
            "{}: config {:#04x} ({}) reported {:?}, expected {:?} - correcting",
            report.wifi_serial,
            report.config_id,
            ConfigDescription::from_id(report.config_id),
            String::from_utf8_lossy(&report.config_value),
            expected
        );

        Some(ConfigResponse {
            wifi_serial: report.wifi_serial,
            config_id: report.config_id,
            config_value: expected.into_bytes(),
        })
    }
}
