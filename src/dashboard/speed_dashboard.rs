//! Interactive terminal dashboard for speed measurement
//!
//! The dashboard owns the view state machine (idle, downloading, uploading,
//! complete) and the persisted run history. Measurement itself happens on a
//! spawned background task that reports through an event channel; the UI loop
//! drains that channel once per tick, so the samplers never know a terminal
//! exists.

use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{debug, error, info, warn};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Sparkline},
};
use std::{collections::VecDeque, io, time::Duration};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::lookup::{NetworkInfo, NetworkInfoLookup};
use crate::sampler::{DownloadSampler, ProgressFn, UploadSampler, format_mbps};
use crate::storage::{HistoryRecord, HistoryStore};

/// Number of instantaneous readings kept for the sparkline
const RATE_WINDOW: usize = 50;

/// View state machine for one measurement run
///
/// Owned by the dashboard (or any other caller), never by the samplers: the
/// measurement core stays a pair of async functions, and the presentation
/// layer decides what "running" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Downloading,
    Uploading,
    Complete,
}

impl TestPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TestPhase::Idle => "Idle",
            TestPhase::Downloading => "Downloading",
            TestPhase::Uploading => "Uploading",
            TestPhase::Complete => "Complete",
        }
    }

    /// True while a sampler is driving the connection
    pub fn is_running(&self) -> bool {
        matches!(self, TestPhase::Downloading | TestPhase::Uploading)
    }

    fn color(&self) -> Color {
        match self {
            TestPhase::Idle => Color::DarkGray,
            TestPhase::Downloading => Color::Green,
            TestPhase::Uploading => Color::Blue,
            TestPhase::Complete => Color::Cyan,
        }
    }
}

/// Coarse quality classification of a measured speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedRating {
    Slow,
    Good,
    Excellent,
}

impl SpeedRating {
    /// Classifies a download result (below 5 is slow, below 25 good)
    pub fn for_download(mbps: f64) -> Self {
        if mbps < 5.0 {
            SpeedRating::Slow
        } else if mbps < 25.0 {
            SpeedRating::Good
        } else {
            SpeedRating::Excellent
        }
    }

    /// Classifies an upload result (below 2 is slow, below 10 good)
    pub fn for_upload(mbps: f64) -> Self {
        if mbps < 2.0 {
            SpeedRating::Slow
        } else if mbps < 10.0 {
            SpeedRating::Good
        } else {
            SpeedRating::Excellent
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedRating::Slow => "Slow",
            SpeedRating::Good => "Good",
            SpeedRating::Excellent => "Excellent",
        }
    }

    fn color(&self) -> Color {
        match self {
            SpeedRating::Slow => Color::Red,
            SpeedRating::Good => Color::Yellow,
            SpeedRating::Excellent => Color::Green,
        }
    }
}

/// Notifications flowing from background tasks to the UI loop
#[derive(Debug)]
pub enum TestEvent {
    DownloadProgress { loaded: u64, total: u64, mbps: f64 },
    DownloadFinished(f64),
    DownloadFailed(String),
    UploadProgress { loaded: u64, total: u64, mbps: f64 },
    UploadFinished(f64),
    InfoLoaded(NetworkInfo),
    InfoFailed(String),
}

/// Runs download then upload on a background task, reporting through events
///
/// The download half is mandatory: when it fails the run stops and the
/// failure is reported. The upload half degrades to zero on its own.
async fn drive_speed_test(settings: Settings, events: mpsc::UnboundedSender<TestEvent>) {
    let download_result = match DownloadSampler::from_settings(&settings) {
        Ok(sampler) => {
            let progress = events.clone();
            let on_progress: ProgressFn = Box::new(move |loaded, total, mbps| {
                let _ = progress.send(TestEvent::DownloadProgress { loaded, total, mbps });
            });
            sampler.run(Some(on_progress)).await
        }
        Err(err) => Err(err),
    };

    match download_result {
        Ok(average) => {
            let _ = events.send(TestEvent::DownloadFinished(average));
        }
        Err(err) => {
            let _ = events.send(TestEvent::DownloadFailed(err.to_string()));
            return;
        }
    }

    let upload_average = match UploadSampler::from_settings(&settings) {
        Ok(sampler) => {
            let progress = events.clone();
            let on_progress: ProgressFn = Box::new(move |loaded, total, mbps| {
                let _ = progress.send(TestEvent::UploadProgress { loaded, total, mbps });
            });
            sampler.run(Some(on_progress)).await
        }
        Err(err) => {
            warn!("Upload sampler unavailable, reporting zero: {err}");
            0.0
        }
    };
    let _ = events.send(TestEvent::UploadFinished(upload_average));
}

/// Fetches network metadata on a background task
async fn drive_info_lookup(settings: Settings, events: mpsc::UnboundedSender<TestEvent>) {
    let outcome = match NetworkInfoLookup::from_settings(&settings) {
        Ok(lookup) => lookup.run().await,
        Err(err) => Err(err),
    };
    let _ = match outcome {
        Ok(info) => events.send(TestEvent::InfoLoaded(info)),
        Err(err) => events.send(TestEvent::InfoFailed(err.to_string())),
    };
}

/// Real-time terminal dashboard for running speed tests
/// Displays transfer progress, results with quality ratings, network metadata
/// and the bounded run history using ratatui
pub struct Dashboard {
    /// Settings cloned into every background task
    settings: Settings,
    /// Bounded persisted history, owned here and never by the samplers
    history: HistoryStore,
    /// Sender handed to background tasks
    event_tx: mpsc::UnboundedSender<TestEvent>,
    /// Receiver drained once per UI tick
    event_rx: mpsc::UnboundedReceiver<TestEvent>,
    /// Current view state machine value
    phase: TestPhase,
    /// Progress of the active transfer
    bytes_transferred: u64,
    total_bytes: u64,
    /// Most recent instantaneous reading
    current_mbps: Option<f64>,
    /// Rolling window of instantaneous readings for the sparkline
    rate_history: VecDeque<f64>,
    /// Results of the last completed (or in-flight) run
    download_mbps: Option<f64>,
    upload_mbps: Option<f64>,
    /// Metadata snapshot once fetched
    network_info: Option<NetworkInfo>,
    /// A lookup task is in flight
    info_pending: bool,
    /// Cached history rows for rendering, oldest first
    recent_runs: Vec<HistoryRecord>,
    /// Error message to display in UI
    error_message: Option<String>,
}

impl Dashboard {
    /// Creates a dashboard, opening the history store configured in settings
    pub fn new(settings: Settings) -> Result<Self> {
        let history = HistoryStore::open(&settings.history_path)?;
        let recent_runs = history.recent()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            settings,
            history,
            event_tx,
            event_rx,
            phase: TestPhase::Idle,
            bytes_transferred: 0,
            total_bytes: 0,
            current_mbps: None,
            rate_history: VecDeque::with_capacity(RATE_WINDOW),
            download_mbps: None,
            upload_mbps: None,
            network_info: None,
            info_pending: false,
            recent_runs,
            error_message: None,
        })
    }

    /// Main entry point for the dashboard
    /// Sets up terminal, runs the UI loop, and cleans up on exit
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting speed test dashboard");

        // Setup terminal for full-screen UI
        debug!("Setting up terminal for full-screen UI");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Run the main application loop
        let res = self.run_app(&mut terminal).await;

        // Cleanup terminal state before exiting
        debug!("Cleaning up terminal state");
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        if let Err(err) = res {
            error!("Dashboard error: {err:?}");
            eprintln!("Error: {err:?}");
        } else {
            info!("Dashboard exited normally");
        }

        Ok(())
    }

    /// Main application loop: drain background events, render, poll keys
    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        loop {
            self.drain_events();

            terminal.draw(|f| self.ui(f))?;

            // Check for keyboard input (non-blocking with 100ms timeout)
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') => self.start_test(),
                        KeyCode::Char('n') => self.start_info_lookup(),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Spawns a measurement run unless one is already active
    fn start_test(&mut self) {
        if self.phase.is_running() {
            debug!("Ignoring test request while a run is active");
            return;
        }

        info!("Starting measurement run from dashboard");
        self.phase = TestPhase::Downloading;
        self.bytes_transferred = 0;
        self.total_bytes = 0;
        self.current_mbps = None;
        self.download_mbps = None;
        self.upload_mbps = None;
        self.rate_history.clear();
        self.error_message = None;

        tokio::spawn(drive_speed_test(
            self.settings.clone(),
            self.event_tx.clone(),
        ));
    }

    /// Spawns a metadata lookup unless one is already in flight
    fn start_info_lookup(&mut self) {
        if self.info_pending {
            return;
        }
        self.info_pending = true;
        tokio::spawn(drive_info_lookup(
            self.settings.clone(),
            self.event_tx.clone(),
        ));
    }

    /// Applies everything the background tasks produced since the last tick
    fn drain_events(&mut self) {
        let mut drained = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            drained.push(event);
        }
        for event in drained {
            self.apply_event(event);
        }
    }

    /// Advances the view state with one background event
    fn apply_event(&mut self, event: TestEvent) {
        match event {
            TestEvent::DownloadProgress {
                loaded,
                total,
                mbps,
            } => {
                self.bytes_transferred = loaded;
                self.total_bytes = total;
                self.current_mbps = Some(mbps);
                self.push_rate(mbps);
            }
            TestEvent::DownloadFinished(average) => {
                info!("Download phase finished: {average:.2} Mbit/s");
                self.download_mbps = Some(average);
                self.phase = TestPhase::Uploading;
                self.bytes_transferred = 0;
                self.total_bytes = self.settings.upload_total_bytes;
                self.current_mbps = None;
                self.rate_history.clear();
            }
            TestEvent::DownloadFailed(reason) => {
                error!("Measurement run failed: {reason}");
                self.error_message = Some(format!("Download failed: {reason}"));
                self.phase = TestPhase::Idle;
                self.current_mbps = None;
            }
            TestEvent::UploadProgress {
                loaded,
                total,
                mbps,
            } => {
                self.bytes_transferred = loaded;
                self.total_bytes = total;
                self.current_mbps = Some(mbps);
                self.push_rate(mbps);
            }
            TestEvent::UploadFinished(average) => {
                info!("Upload phase finished: {average:.2} Mbit/s");
                self.upload_mbps = Some(average);
                self.phase = TestPhase::Complete;
                self.current_mbps = None;
                self.record_completed_run();
            }
            TestEvent::InfoLoaded(info) => {
                self.info_pending = false;
                self.network_info = Some(info);
            }
            TestEvent::InfoFailed(reason) => {
                warn!("Network info lookup failed: {reason}");
                self.info_pending = false;
                self.error_message = Some(format!("Network info unavailable: {reason}"));
            }
        }
    }

    fn push_rate(&mut self, mbps: f64) {
        self.rate_history.push_back(mbps);
        if self.rate_history.len() > RATE_WINDOW {
            self.rate_history.pop_front();
        }
    }

    /// Timestamps and persists a completed run; failures surface in the UI
    /// instead of crashing the dashboard
    fn record_completed_run(&mut self) {
        let (Some(download_mbps), Some(upload_mbps)) = (self.download_mbps, self.upload_mbps)
        else {
            return;
        };

        let record = HistoryRecord {
            recorded_at: Local::now(),
            download_mbps,
            upload_mbps,
        };
        match self.history.append(&record) {
            Ok(()) => match self.history.recent() {
                Ok(records) => self.recent_runs = records,
                Err(err) => warn!("Could not re-read run history: {err}"),
            },
            Err(err) => {
                warn!("Could not persist run history: {err}");
                self.error_message = Some(format!("History not saved: {err}"));
            }
        }
    }

    /// Main UI layout function
    /// Divides the terminal into sections and renders each component
    fn ui(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints(
                [
                    Constraint::Length(3), // Header section
                    Constraint::Length(3), // Status section
                    Constraint::Length(3), // Transfer progress gauge
                    Constraint::Length(4), // Results section
                    Constraint::Length(5), // Rate sparkline
                    Constraint::Min(8),    // Network info and history
                    Constraint::Length(3), // Footer section
                ]
                .as_ref(),
            )
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_status(frame, chunks[1]);
        self.render_progress(frame, chunks[2]);
        self.render_results(frame, chunks[3]);
        self.render_rate_sparkline(frame, chunks[4]);
        self.render_info_and_history(frame, chunks[5]);
        self.render_footer(frame, chunks[6]);
    }

    /// Renders the header section with title and current timestamp
    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let header = vec![Line::from(vec![
            Span::raw("Speed Probe - Connection Dashboard"),
            Span::raw("    "),
            Span::styled(
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                Style::default().fg(Color::Yellow),
            ),
        ])];

        let block = Block::default()
            .borders(Borders::ALL)
            .style(Style::default().fg(Color::White));

        let paragraph = Paragraph::new(header).block(block);
        frame.render_widget(paragraph, area);
    }

    /// Renders the current phase and any pending error
    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let status_text = if let Some(error) = &self.error_message {
            vec![Line::from(vec![
                Span::styled("! ", Style::default().fg(Color::Yellow)),
                Span::styled(error.clone(), Style::default().fg(Color::Yellow)),
            ])]
        } else {
            let mut spans = vec![
                Span::raw("Phase: "),
                Span::styled(
                    self.phase.label(),
                    Style::default()
                        .fg(self.phase.color())
                        .add_modifier(Modifier::BOLD),
                ),
            ];
            if self.info_pending {
                spans.push(Span::raw("  |  "));
                spans.push(Span::styled(
                    "Fetching network info...",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            vec![Line::from(spans)]
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Status")
            .style(Style::default().fg(Color::White));

        let paragraph = Paragraph::new(status_text).block(block);
        frame.render_widget(paragraph, area);
    }

    /// Renders transfer progress as a gauge with the current reading
    fn render_progress(&self, frame: &mut Frame, area: Rect) {
        let ratio = if self.total_bytes > 0 {
            (self.bytes_transferred as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let label = match self.current_mbps {
            Some(mbps) => format!("{:.0}% at {}", ratio * 100.0, format_mbps(mbps)),
            None if self.phase.is_running() => "starting...".to_string(),
            None => "no transfer active".to_string(),
        };

        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Transfer Progress"),
            )
            .gauge_style(Style::default().fg(self.phase.color()))
            .ratio(ratio)
            .label(label);

        frame.render_widget(gauge, area);
    }

    /// Renders download and upload results side by side with quality ratings
    fn render_results(&self, frame: &mut Frame, area: Rect) {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(area);

        self.render_result_panel(
            frame,
            halves[0],
            "Download",
            self.download_mbps,
            SpeedRating::for_download,
        );
        self.render_result_panel(
            frame,
            halves[1],
            "Upload",
            self.upload_mbps,
            SpeedRating::for_upload,
        );
    }

    fn render_result_panel(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: &str,
        result: Option<f64>,
        rate: fn(f64) -> SpeedRating,
    ) {
        let lines = match result {
            Some(mbps) => {
                let rating = rate(mbps);
                vec![Line::from(vec![
                    Span::styled(
                        format_mbps(mbps),
                        Style::default()
                            .fg(rating.color())
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(rating.label(), Style::default().fg(rating.color())),
                ])]
            }
            None => vec![Line::from(Span::styled(
                "--",
                Style::default().fg(Color::DarkGray),
            ))],
        };

        let block = Block::default().borders(Borders::ALL).title(title.to_string());
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    /// Renders the rolling instantaneous-rate sparkline
    fn render_rate_sparkline(&self, frame: &mut Frame, area: Rect) {
        // Sparkline wants u64 values; hundredths of a Mbit keep sub-1 Mbit/s
        // rates visible
        let data: Vec<u64> = self
            .rate_history
            .iter()
            .map(|&mbps| (mbps * 100.0) as u64)
            .collect();
        let max = data.iter().max().copied().unwrap_or(1);

        let title = match self.current_mbps {
            Some(mbps) => format!("Instantaneous Rate (Current: {})", format_mbps(mbps)),
            None => "Instantaneous Rate".to_string(),
        };

        let sparkline = Sparkline::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .title_style(Style::default().fg(Color::Green)),
            )
            .data(&data)
            .max(max.max(1))
            .style(Style::default().fg(Color::Green));

        frame.render_widget(sparkline, area);
    }

    /// Renders the network info panel and history list side by side
    fn render_info_and_history(&self, frame: &mut Frame, area: Rect) {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
            .split(area);

        self.render_network_info(frame, halves[0]);
        self.render_history(frame, halves[1]);
    }

    fn render_network_info(&self, frame: &mut Frame, area: Rect) {
        let lines = match &self.network_info {
            Some(info) => vec![
                Line::from(vec![
                    Span::raw("IP:      "),
                    Span::styled(info.ip.clone(), Style::default().fg(Color::Cyan)),
                ]),
                Line::from(vec![Span::raw("ISP:     "), Span::raw(info.isp.clone())]),
                Line::from(vec![Span::raw("City:    "), Span::raw(info.city.clone())]),
                Line::from(vec![Span::raw("Region:  "), Span::raw(info.region.clone())]),
                Line::from(vec![Span::raw("Country: "), Span::raw(info.country.clone())]),
            ],
            None if self.info_pending => vec![Line::from("Fetching...")],
            None => vec![Line::from("Press 'n' to fetch network info")],
        };

        let block = Block::default().borders(Borders::ALL).title("Network Info");
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_history(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .recent_runs
            .iter()
            .map(|record| {
                let content = vec![Line::from(vec![
                    Span::styled(
                        record.recorded_at.format("%Y-%m-%d %H:%M").to_string(),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::raw(format!(
                        "  ↓ {:<14} ↑ {}",
                        format_mbps(record.download_mbps),
                        format_mbps(record.upload_mbps),
                    )),
                ])];
                ListItem::new(content)
            })
            .collect();

        let title = if items.is_empty() {
            "Run History (none yet)".to_string()
        } else {
            format!("Run History (last {})", items.len())
        };

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::White));

        frame.render_widget(list, area);
    }

    /// Renders the footer with keyboard shortcuts
    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let footer = Paragraph::new("Press 'r' to run a test | 'n' for network info | 'q' to quit")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::TOP));

        frame.render_widget(footer, area);
    }
}
