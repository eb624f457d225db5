use crate::prelude::*;

use crate::growatt::dongle::ChannelData;
use crate::growatt::packet::InputRegister;

static STATUS_URL: &str = "https://pvoutput.org/service/r2/addstatus.jsp";

/// Uploads generation status to PVOutput on a fixed interval, reading
/// the latest snapshot from the register store.
#[derive(Clone)]
pub struct PvOutput {
    config: ConfigWrapper,
    channels: Channels,
    register_cache: RegisterCache,
}

impl PvOutput {
    pub fn new(config: ConfigWrapper, channels: Channels, register_cache: RegisterCache) -> Self {
        Self {
            config,
            channels,
            register_cache,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let settings = match self.config.pvoutput() {
            Some(s) if s.enabled() => s,
            _ => {
                info!("pvoutput disabled, skipping");
                return Ok(());
            }
        };

        info!(
            "pvoutput uploads every {} minutes for system {}",
            settings.status_interval(),
            settings.system_id()
        );

        let client = reqwest::Client::new();
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(settings.status_interval() * 60));
        let mut receiver = self.channels.from_dongle.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.upload(&client, &settings).await {
                        error!("pvoutput upload failed: {}", e);
                    }
                }
                message = receiver.recv() => {
                    if let Ok(ChannelData::Shutdown) = message {
                        info!("pvoutput received shutdown signal");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn upload(&self, client: &reqwest::Client, settings: &config::Pvoutput) -> Result<()> {
        let registers = self.register_cache.snapshot();

        // eac_today is 0.1 kWh -> Wh; pac is 0.1 W -> W
        let energy_wh = registers.u32_value(Namespace::Input, InputRegister::EacToday.into()) * 100;
        let power_w =
            registers.u32_value(Namespace::Input, InputRegister::Pac.into()) as f64 * 0.1;

        if energy_wh == 0 && power_w == 0.0 {
            debug!("no data to upload to pvoutput");
            return Ok(());
        }

        let now = chrono::Local::now();
        let form = [
            ("d", now.format("%Y%m%d").to_string()),
            ("t", now.format("%H:%M").to_string()),
            ("v1", energy_wh.to_string()),
            ("v2", format!("{:.1}", power_w)),
        ];

        let response = client
            .post(STATUS_URL)
            .header("X-Pvoutput-Apikey", settings.api_key())
            .header("X-Pvoutput-SystemId", settings.system_id())
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("pvoutput returned {}", response.status());
        }

        info!("pvoutput upload ok ({}Wh / {:.1}W)", energy_wh, power_w);
        Ok(())
    }
}
