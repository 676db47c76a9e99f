//! Fixture-backed provider replaying recorded paging sequences.
//!
//! Fixtures live in one directory:
//!
//! * `<CODE>.<dataset>.json` - `[[BarRow, ...], ...]`, one inner array per
//!   page, newest rows first within a page
//! * `<CODE>.ticks.json` - the same shape with tick rows
//! * `universe.json` - `[UniverseRow, ...]`
//!
//! A missing fixture replays as an exhausted sequence, which the sync layer
//! treats as "terminal has no data for this series". The in-memory staging
//! constructors serve the tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::{
    BarRow, ChartDataProvider, ChartPage, ChartRequest, TickPage, TickRequest, TickRow,
    UniverseRow,
};

struct Sequence<T> {
    pages: Vec<Vec<T>>,
    cursor: usize,
}

impl<T: Clone> Sequence<T> {
    fn next_page(&mut self) -> (Vec<T>, bool) {
        if self.cursor >= self.pages.len() {
            return (Vec::new(), false);
        }
        let rows = self.pages[self.cursor].clone();
        self.cursor += 1;
        (rows, self.cursor < self.pages.len())
    }
}

#[derive(Default)]
struct ReplayState {
    charts: HashMap<String, Sequence<BarRow>>,
    ticks: HashMap<String, Sequence<TickRow>>,
    universe: Vec<UniverseRow>,
}

/// Replays recorded terminal sessions from fixtures or staged pages.
pub struct ReplayProvider {
    fixtures: Option<PathBuf>,
    state: Mutex<ReplayState>,
    connected: AtomicBool,
    chart_calls: AtomicUsize,
    tick_calls: AtomicUsize,
}

impl ReplayProvider {
    /// Empty in-memory provider; stage sequences before use.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            fixtures: None,
            state: Mutex::new(ReplayState::default()),
            connected: AtomicBool::new(true),
            chart_calls: AtomicUsize::new(0),
            tick_calls: AtomicUsize::new(0),
        }
    }

    /// Provider reading fixture files from `dir` on first use of each
    /// sequence.
    #[must_use]
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            fixtures: Some(dir.into()),
            state: Mutex::new(ReplayState::default()),
            connected: AtomicBool::new(true),
            chart_calls: AtomicUsize::new(0),
            tick_calls: AtomicUsize::new(0),
        }
    }

    /// Stage a chart paging sequence for `code` in `dataset`.
    pub fn stage_chart(&self, code: &str, dataset: &str, pages: Vec<Vec<BarRow>>) {
        let mut state = self.state.lock().expect("replay state mutex poisoned");
        state.charts.insert(
            sequence_key(code, dataset),
            Sequence { pages, cursor: 0 },
        );
    }

    pub fn stage_ticks(&self, code: &str, pages: Vec<Vec<TickRow>>) {
        let mut state = self.state.lock().expect("replay state mutex poisoned");
        state
            .ticks
            .insert(code.to_owned(), Sequence { pages, cursor: 0 });
    }

    pub fn stage_universe(&self, rows: Vec<UniverseRow>) {
        let mut state = self.state.lock().expect("replay state mutex poisoned");
        state.universe = rows;
    }

    /// Rewind every staged sequence, as a fresh terminal session would.
    pub fn rewind(&self) {
        let mut state = self.state.lock().expect("replay state mutex poisoned");
        for sequence in state.charts.values_mut() {
            sequence.cursor = 0;
        }
        for sequence in state.ticks.values_mut() {
            sequence.cursor = 0;
        }
    }

    /// Simulate the terminal session dropping.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Total chart page requests served. Lets tests assert an up-to-date
    /// series costs zero terminal calls.
    #[must_use]
    pub fn chart_calls(&self) -> usize {
        self.chart_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tick_calls(&self) -> usize {
        self.tick_calls.load(Ordering::SeqCst)
    }

    fn load_chart_fixture(&self, code: &str, dataset: &str) -> Result<Vec<Vec<BarRow>>, ProviderError> {
        self.load_fixture(format!("{code}.{dataset}.json"))
    }

    fn load_tick_fixture(&self, code: &str) -> Result<Vec<Vec<TickRow>>, ProviderError> {
        self.load_fixture(format!("{code}.ticks.json"))
    }

    fn load_fixture<T: serde::de::DeserializeOwned + Default>(
        &self,
        file_name: String,
    ) -> Result<T, ProviderError> {
        let Some(dir) = self.fixtures.as_ref() else {
            return Ok(T::default());
        };
        let path = dir.join(file_name);
        if !path.exists() {
            return Ok(T::default());
        }
        let raw = fs::read_to_string(&path).map_err(|error| ProviderError::Fixture {
            path: path.clone(),
            message: error.to_string(),
        })?;
        serde_json::from_str(raw.as_str()).map_err(|error| ProviderError::Fixture {
            path,
            message: error.to_string(),
        })
    }
}

impl ChartDataProvider for ReplayProvider {
    fn ensure_connected(&self) -> Result<(), ProviderError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Disconnected)
        }
    }

    fn next_chart_page(&self, request: &ChartRequest) -> Result<ChartPage, ProviderError> {
        self.ensure_connected()?;
        self.chart_calls.fetch_add(1, Ordering::SeqCst);

        let code = request.code.as_str();
        let dataset = request.timeframe.dataset();
        let key = sequence_key(code, dataset.as_str());

        let mut state = self.state.lock().expect("replay state mutex poisoned");
        if !state.charts.contains_key(key.as_str()) {
            drop(state);
            let pages = self.load_chart_fixture(code, dataset.as_str())?;
            state = self.state.lock().expect("replay state mutex poisoned");
            state
                .charts
                .entry(key.clone())
                .or_insert(Sequence { pages, cursor: 0 });
        }

        let sequence = state
            .charts
            .get_mut(key.as_str())
            .expect("sequence staged above");
        let (rows, has_more) = sequence.next_page();
        Ok(ChartPage { rows, has_more })
    }

    fn next_tick_page(&self, request: &TickRequest) -> Result<TickPage, ProviderError> {
        self.ensure_connected()?;
        self.tick_calls.fetch_add(1, Ordering::SeqCst);

        let code = request.code.as_str();
        let mut state = self.state.lock().expect("replay state mutex poisoned");
        if !state.ticks.contains_key(code) {
            drop(state);
            let pages = self.load_tick_fixture(code)?;
            state = self.state.lock().expect("replay state mutex poisoned");
            state
                .ticks
                .entry(code.to_owned())
                .or_insert(Sequence { pages, cursor: 0 });
        }

        let sequence = state
            .ticks
            .get_mut(code)
            .expect("sequence staged above");
        let (rows, has_more) = sequence.next_page();
        Ok(TickPage { rows, has_more })
    }

    fn universe(&self) -> Result<Vec<UniverseRow>, ProviderError> {
        self.ensure_connected()?;

        let state = self.state.lock().expect("replay state mutex poisoned");
        if !state.universe.is_empty() || self.fixtures.is_none() {
            return Ok(state.universe.clone());
        }
        drop(state);

        let rows: Vec<UniverseRow> = self.load_fixture(String::from("universe.json"))?;
        let mut state = self.state.lock().expect("replay state mutex poisoned");
        if state.universe.is_empty() {
            state.universe = rows;
        }
        Ok(state.universe.clone())
    }
}

fn sequence_key(code: &str, dataset: &str) -> String {
    format!("{code}:{dataset}")
}
