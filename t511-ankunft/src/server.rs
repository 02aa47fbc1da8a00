//! HTTP endpoint exposing the arrival board to displays.

use chrono::{DateTime, Duration, Utc};
use rouille::{Request, Response, router};
use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, PoisonError};
use t511_util::http::HttpServer;

use crate::board::{ArrivalRecord, Board};
use crate::classify::Palette;
use crate::config::Settings;
use crate::errors::{AnkunftError, AnkunftResult};
use crate::scheduler::{Clock, RefreshTrigger};
use crate::sources::SourceId;

/// Fallback window for `/active` when no max ETA is configured.
static DEFAULT_ACTIVE_MINS: i64 = 60;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecordView {
    pub route: String,
    pub direction: String,
    pub stop: String,
    pub expected: DateTime<Utc>,
    /// Whole minutes until arrival (negative if overdue).
    pub minutes: i64,
    pub live: bool,
    pub color: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct SourceView {
    pub source: SourceId,
    pub updated: Option<DateTime<Utc>>,
    pub records: Vec<RecordView>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ArrivalsView {
    pub separator_color: String,
    pub sources: Vec<SourceView>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ActiveView {
    pub within_mins: i64,
    pub count: usize,
    pub routes: Vec<String>,
}

pub struct App {
    board: Arc<RwLock<Board>>,
    palette: Arc<Palette>,
    separator: String,
    clock: Arc<dyn Clock>,
    trigger: RefreshTrigger,
    active_mins: i64,
}

impl App {
    pub fn new(settings: &Settings, board: Arc<RwLock<Board>>, clock: Arc<dyn Clock>, trigger: RefreshTrigger) -> Self {
        let separator = settings.palette.hex(settings.classifier.separator_color());
        let active_mins = settings.max_eta
            .map(|d| (d.as_secs() / 60) as i64)
            .unwrap_or(DEFAULT_ACTIVE_MINS);
        Self {
            board,
            palette: settings.palette.clone(),
            separator,
            clock,
            trigger,
            active_mins
        }
    }
    fn board(&self) -> RwLockReadGuard<Board> {
        self.board.read().unwrap_or_else(PoisonError::into_inner)
    }
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().unwrap_or_else(Utc::now)
    }
    fn view(&self, rec: &ArrivalRecord, now: DateTime<Utc>) -> RecordView {
        RecordView {
            route: rec.route.clone(),
            direction: rec.direction.clone(),
            stop: rec.stop.clone(),
            expected: rec.expected,
            minutes: (rec.expected - now).num_minutes(),
            live: rec.live,
            color: self.palette.hex(rec.color)
        }
    }
    pub fn arrivals(&self) -> ArrivalsView {
        let now = self.now();
        let board = self.board();
        let sources = (0..board.n_sources())
            .map(SourceId)
            .map(|id| SourceView {
                source: id,
                updated: board.last_updated(id),
                records: board.source_records(id).iter()
                    .map(|r| self.view(r, now))
                    .collect()
            })
            .collect();
        ArrivalsView {
            separator_color: self.separator.clone(),
            sources
        }
    }
    pub fn routes(&self) -> BTreeMap<String, Vec<RecordView>> {
        let now = self.now();
        let board = self.board();
        board.routes().into_iter()
            .map(|(route, recs)| {
                (route.to_owned(), recs.into_iter().map(|r| self.view(r, now)).collect())
            })
            .collect()
    }
    pub fn route(&self, route: String) -> AnkunftResult<Vec<RecordView>> {
        self.routes().remove(&route)
            .ok_or(AnkunftError::NotFound)
    }
    pub fn active(&self, within_mins: Option<i64>) -> ActiveView {
        let within_mins = within_mins.unwrap_or(self.active_mins);
        let board = self.board();
        let routes: Vec<String> = board.active_routes(self.now(), Duration::minutes(within_mins))
            .into_iter()
            .map(|r| r.to_owned())
            .collect();
        ActiveView {
            within_mins,
            count: routes.len(),
            routes
        }
    }
    pub fn refresh(&self) {
        self.trigger.request();
    }
}

impl HttpServer for App {
    type Error = AnkunftError;
    fn on_request(&self, req: &Request) -> AnkunftResult<Response> {
        router!(req,
            (GET) (/) => {
                Ok(Response::text(concat!("t511-ankunft ", env!("CARGO_PKG_VERSION"), "\n")))
            },
            (GET) (/arrivals) => {
                Ok(Response::json(&self.arrivals()))
            },
            (GET) (/routes) => {
                Ok(Response::json(&self.routes()))
            },
            (GET) (/routes/{route}) => {
                self.route(route)
                    .map(|x| Response::json(&x))
            },
            (GET) (/active) => {
                let within = match req.get_param("within_mins") {
                    Some(w) => {
                        let w: i64 = w.parse()
                            .map_err(|_| AnkunftError::BadParameter("within_mins"))?;
                        if w < 0 {
                            return Err(AnkunftError::BadParameter("within_mins"));
                        }
                        Some(w)
                    },
                    None => None
                };
                Ok(Response::json(&self.active(within)))
            },
            (POST) (/refresh) => {
                self.refresh();
                Ok(Response::text("refresh requested\n").with_status_code(202))
            },
            _ => {
                Err(AnkunftError::NotFound)
            }
        )
    }
}
