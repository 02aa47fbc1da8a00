use log::*;
use std::sync::{Arc, RwLock};
use t511_util::ConfigExt;
use t511_ankunft::board::Board;
use t511_ankunft::config::{Config, Settings};
use t511_ankunft::errors::{DependencyError, Result};
use t511_ankunft::fetch::{AlwaysReady, HttpFetcher};
use t511_ankunft::scheduler::{RefreshScheduler, SystemClock};
use t511_ankunft::server::App;

fn main() -> Result<()> {
    t511_util::setup_logging()?;
    info!("t511-ankunft starting");
    info!("loading config");
    let cfg = Config::load()?;
    let settings = Settings::from_raw(cfg)?;
    settings.dump();
    info!("initializing HTTP client");
    let fetcher = HttpFetcher::new(&settings.user_agent, settings.fetch_timeout)?;
    let clock = Arc::new(SystemClock);
    let board = Arc::new(RwLock::new(Board::new(settings.sources.len())));
    let sched = RefreshScheduler::new(&settings, clock.clone(), Arc::new(AlwaysReady), Arc::new(fetcher), board.clone())?;
    let handle = sched.run()?;
    let app = App::new(&settings, board, clock, handle.trigger());
    if let Err(e) = t511_util::http::start_server(&settings.listen, app) {
        error!("{}", e);
        handle.shutdown();
        return Err(DependencyError::from(e).into());
    }
    Ok(())
}
