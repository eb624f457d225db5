use crate::prelude::*;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::growatt::packet::EnergyRequest;

/// Appends one JSON line per decoded energy report; raw register words
/// in hex, keyed by register number.
#[derive(Debug, Clone)]
pub struct DatalogWriter {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
}

impl DatalogWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("opening datalog file at {}", path);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
        })
    }

    pub fn write_energy(&self, reading: &EnergyRequest, buffered: bool) -> Result<()> {
        let register_type = if buffered { "buffered" } else { "input" };
        self.write_data(
            reading.wifi_serial,
            reading.inverter_serial,
            register_type,
            &reading.register_pairs(),
        )
    }

    fn write_data(
        &self,
        wifi_serial: Serial,
        inverter_serial: Serial,
        register_type: &str,
        data: &[(u16, u16)],
    ) -> Result<()> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let mut raw_data = serde_json::Map::new();
        for (register, value) in data {
            raw_data.insert(
                register.to_string(),
                serde_json::Value::String(format!("{:#06X}", value)),
            );
        }

        let line = serde_json::json!({
            "utc_timestamp": timestamp,
            "wifi_serial": wifi_serial.to_string(),
            "inverter_serial": inverter_serial.to_string(),
            "register_type": register_type,
            "raw_data": raw_data,
        });

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("failed to lock datalog file {}", self.path))?;
        writeln!(file, "{}", serde_json::to_string(&line)?)?;
        file.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    #[test]
    fn writes_register_words_as_hex() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let writer = DatalogWriter::new(temp_file.path().to_str().unwrap())?;

        let wifi = Serial::from_str("ABC1D2345E")?;
        let inverter = Serial::from_str("WXY9Z87654")?;
        writer.write_data(wifi, inverter, "input", &[(0, 1234), (1, 5678)])?;

        let contents = std::fs::read_to_string(temp_file.path())?;
        let json: serde_json::Value = serde_json::from_str(&contents)?;

        assert_eq!(json["wifi_serial"], "ABC1D2345E");
        assert_eq!(json["inverter_serial"], "WXY9Z87654");
        assert_eq!(json["register_type"], "input");
        assert_eq!(json["raw_data"]["0"], "0x04D2");
        assert_eq!(json["raw_data"]["1"], "0x162E");

        Ok(())
    }

    #[test]
    fn appends_one_line_per_write() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let writer = DatalogWriter::new(temp_file.path().to_str().unwrap())?;

        let wifi = Serial::from_str("ABC1D2345E")?;
        let inverter = Serial::from_str("WXY9Z87654")?;
        writer.write_data(wifi, inverter, "input", &[(0, 1)])?;
        writer.write_data(wifi, inverter, "buffered", &[(0, 2)])?;

        let contents = std::fs::read_to_string(temp_file.path())?;
        assert_eq!(contents.lines().count(), 2);

        Ok(())
    }
}
