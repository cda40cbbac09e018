#![forbid(unsafe_code)]

use std::time::Duration;

use argh::FromArgs;
use hwdash_client::{
    config,
    fetch::MetricsFetcher,
    store::{MetricsStore, StoreState},
};
use simple_logger::SimpleLogger;
use tokio::time::sleep;

#[derive(FromArgs, Debug)]
#[argh(description = "Terminal poller for the hardware metrics dashboard store.")]
struct Cli {
    #[argh(
        option,
        short = 'c',
        default = "\"config.toml\".to_string()",
        description = "path to config file"
    )]
    pub config_path: String,
    #[argh(
        option,
        short = 'i',
        description = "seconds between polls (overrides configuration)"
    )]
    pub interval: Option<u64>,
    #[argh(switch, description = "poll once and exit")]
    pub once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new().env().init()?;

    let cli: Cli = argh::from_env();
    log::debug!("cli arguments: {cli:#?}");

    let conf = config::load(&cli.config_path)?;
    let interval = Duration::from_secs(cli.interval.unwrap_or(conf.poll_interval));

    let store = MetricsStore::new(MetricsFetcher::new(&conf), conf.last_update);

    // One refresh at a time: the timer only re-arms after completion.
    loop {
        store.refresh().await;
        report(&store.state());

        if cli.once {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = sleep(interval) => {}
        }
    }
}

fn report(state: &StoreState) {
    if let Some(error) = &state.error {
        log::warn!("{error}");
    }

    if let Some(snap) = &state.snapshot {
        let local = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
        let updated = state
            .last_update
            .map(|t| t.to_offset(local).to_string())
            .unwrap_or_else(|| "never".to_owned());

        log::info!(
            "{}: cpu {:.1}/{:.1} degC {:.1} W, gpu {:.1} degC {:.1} W (updated {updated})",
            snap.pc_name,
            snap.cpu_temp_tctl,
            snap.cpu_temp_ccd1,
            snap.cpu_power,
            snap.gpu_temp,
            snap.gpu_power,
        );
    }
}
