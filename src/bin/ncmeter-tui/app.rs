use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ncmeter::config::{save_settings, Settings};
use ncmeter::logger::open_logger;
use ncmeter::{
    CommandTransport, MetricsRecorder, Role, SessionController, SessionEvent, TransferRequest,
};

use super::ui;

const ACTIVITY_LINES: usize = 256;

/// Terminal guard that ensures proper cleanup on drop
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Best-effort terminal restoration
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = io::stdout().flush();
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Field {
    Host,
    Port,
    File,
    Export,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Host => "IP Address",
            Field::Port => "Port",
            Field::File => "File to send",
            Field::Export => "Export CSV to",
        }
    }

    fn next(self) -> Field {
        match self {
            Field::Host => Field::Port,
            Field::Port => Field::File,
            Field::File | Field::Export => Field::Host,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Normal,
    Editing(Field),
    Help,
}

pub struct AppState {
    pub session: SessionController,
    pub settings: Settings,
    pub config_path: PathBuf,
    pub host: String,
    pub port: String,
    pub file: String,
    pub export_path: String,
    pub focus: Field,
    pub ui_mode: UiMode,
    /// Value of the field before editing started, restored on Esc
    pub edit_backup: String,
    pub activity: VecDeque<String>,
    pub status: String,
    pub error: Option<String>,
    pub toast: Option<(String, Instant)>,
    pub spinner_idx: usize,
}

impl AppState {
    fn new(settings: Settings, config_path: PathBuf) -> Self {
        let logger = open_logger(settings.log_file.as_deref());
        let transport = Arc::new(CommandTransport::new(settings.transport.clone()));
        let session = SessionController::new(transport, MetricsRecorder::with_system_cpu())
            .with_logger(logger);
        Self {
            session,
            host: settings.host.clone(),
            port: settings.port.clone(),
            file: String::new(),
            export_path: "transfer_metrics.csv".to_string(),
            settings,
            config_path,
            focus: Field::Host,
            ui_mode: UiMode::Normal,
            edit_backup: String::new(),
            activity: VecDeque::with_capacity(ACTIVITY_LINES),
            status: "Ready".to_string(),
            error: None,
            toast: None,
            spinner_idx: 0,
        }
    }

    pub fn field_value(&self, field: Field) -> &str {
        match field {
            Field::Host => &self.host,
            Field::Port => &self.port,
            Field::File => &self.file,
            Field::Export => &self.export_path,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Host => &mut self.host,
            Field::Port => &mut self.port,
            Field::File => &mut self.file,
            Field::Export => &mut self.export_path,
        }
    }

    pub fn push_activity(&mut self, line: String) {
        if self.activity.len() >= ACTIVITY_LINES {
            let _ = self.activity.pop_front();
        }
        self.activity.push_back(line);
    }

    fn toast(&mut self, msg: impl Into<String>) {
        self.toast = Some((msg.into(), Instant::now()));
    }

    fn notify_error(&mut self, msg: String) {
        self.status = format!("✗ {}", msg);
        self.push_activity(format!("Error: {}", msg));
        self.error = Some(msg);
    }
}

pub fn run(settings: Settings, config_path: PathBuf) -> Result<()> {
    // Install panic hook to restore terminal on panic
    let original_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Worker panics come back as failed transfers; keep the UI up for them
        if std::thread::current().name() == Some("main") {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            let _ = io::stdout().flush();
        }
        original_panic(info);
    }));

    let _guard = TerminalGuard;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut app = AppState::new(settings, config_path);

    loop {
        // Completions arrive from worker threads; apply them here, on the UI thread
        for ev in app.session.poll() {
            apply_event(&mut app, ev);
            app.session.acknowledge();
        }
        if app.session.has_in_flight() {
            app.spinner_idx = (app.spinner_idx + 1) % 10;
        }
        if let Some((_, instant)) = &app.toast {
            if instant.elapsed() > Duration::from_secs(3) {
                app.toast = None;
            }
        }

        terminal.draw(|f| ui::draw(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match app.ui_mode {
                    UiMode::Editing(field) => handle_edit_key(&mut app, field, k.code),
                    UiMode::Help => app.ui_mode = UiMode::Normal,
                    UiMode::Normal => {
                        if app.error.is_some() {
                            // Any key dismisses the error box
                            app.error = None;
                            continue;
                        }
                        let quit = matches!(k.code, KeyCode::Char('q'))
                            || (k.code == KeyCode::Char('c')
                                && k.modifiers.contains(KeyModifiers::CONTROL));
                        if quit {
                            break;
                        }
                        handle_normal_key(&mut app, k.code);
                    }
                }
            }
        }
    }

    // Kill any listener still waiting so it does not outlive the UI
    app.session.shutdown();
    remember_peer(&mut app);
    terminal.show_cursor()?;
    Ok(())
}

fn handle_normal_key(app: &mut AppState, code: KeyCode) {
    match code {
        KeyCode::Tab | KeyCode::Down => app.focus = app.focus.next(),
        KeyCode::Enter => {
            let field = app.focus;
            begin_edit(app, field);
        }
        KeyCode::Char('i') => begin_edit(app, Field::Host),
        KeyCode::Char('p') => begin_edit(app, Field::Port),
        KeyCode::Char('f') | KeyCode::Char('b') => begin_edit(app, Field::File),
        KeyCode::Char('e') => begin_edit(app, Field::Export),
        KeyCode::Char('s') => start(app, Role::Send),
        KeyCode::Char('r') => start(app, Role::Receive),
        KeyCode::Char('c') => clear(app),
        KeyCode::Char('h') | KeyCode::F(1) => app.ui_mode = UiMode::Help,
        _ => {}
    }
}

fn begin_edit(app: &mut AppState, field: Field) {
    if field != Field::Export {
        app.focus = field;
    }
    if field == Field::Export && app.session.log().is_empty() {
        app.toast("No transfer data to export.");
        return;
    }
    app.edit_backup = app.field_value(field).to_string();
    app.ui_mode = UiMode::Editing(field);
}

fn handle_edit_key(app: &mut AppState, field: Field, code: KeyCode) {
    match code {
        KeyCode::Enter => {
            app.ui_mode = UiMode::Normal;
            match field {
                Field::Export => export(app),
                Field::File => {
                    if !app.file.trim().is_empty() {
                        app.status = format!("Selected File: {}", app.file.trim());
                    }
                }
                Field::Host | Field::Port => {}
            }
        }
        KeyCode::Esc => {
            let backup = std::mem::take(&mut app.edit_backup);
            *app.field_mut(field) = backup;
            app.ui_mode = UiMode::Normal;
        }
        KeyCode::Backspace => {
            app.field_mut(field).pop();
        }
        KeyCode::Char(c) => app.field_mut(field).push(c),
        _ => {}
    }
}

fn request_for(app: &AppState, role: Role) -> TransferRequest {
    match role {
        Role::Send => {
            let file = app.file.trim();
            TransferRequest::Send {
                host: app.host.trim().to_string(),
                port: app.port.trim().to_string(),
                source: (!file.is_empty()).then(|| PathBuf::from(file)),
            }
        }
        Role::Receive => TransferRequest::Receive {
            port: app.port.trim().to_string(),
            destination: app.settings.receive_output.clone(),
        },
    }
}

fn start(app: &mut AppState, role: Role) {
    let request = request_for(app, role);
    match app.session.start(request) {
        Ok(ev) => apply_event(app, ev),
        Err(e) => {
            app.notify_error(e.to_string());
            app.session.acknowledge();
        }
    }
}

fn clear(app: &mut AppState) {
    let ev = app.session.clear();
    apply_event(app, ev);
}

fn export(app: &mut AppState) {
    let path = PathBuf::from(app.export_path.trim());
    match app.session.export_csv(&path) {
        Ok(rows) => {
            let msg = format!("Data exported to {} ({} rows)", path.display(), rows);
            app.push_activity(msg.clone());
            app.toast(msg);
        }
        Err(e) => app.notify_error(e.to_string()),
    }
}

pub fn apply_event(app: &mut AppState, ev: SessionEvent) {
    match ev {
        SessionEvent::Started { role, target } => {
            let line = match role {
                Role::Send => format!("Sending file to {}...", target),
                Role::Receive => format!("Starting receiver on {}...", target),
            };
            app.status = line.clone();
            app.push_activity(line);
        }
        SessionEvent::Completed(record) => {
            let line = match record.role() {
                Role::Send => "File sent successfully.",
                Role::Receive => "File received successfully.",
            };
            app.status = format!("✓ {}", line);
            app.push_activity(format!(
                "{} {} bytes at {} KB/s",
                line,
                record.byte_count(),
                ncmeter::log::format_real(record.throughput_kbps())
            ));
            app.toast(line);
        }
        SessionEvent::Failed { role, message } => {
            app.notify_error(format!("{} failed: {}", role, message));
        }
        SessionEvent::Cleared => {
            app.status = "Data cleared".to_string();
            app.push_activity("Cleared transfer data.".to_string());
        }
    }
}

/// Persist host/port edits so the next start opens with them.
fn remember_peer(app: &mut AppState) {
    let host = app.host.trim();
    let port = app.port.trim();
    if host == app.settings.host && port == app.settings.port {
        return;
    }
    app.settings.host = host.to_string();
    app.settings.port = port.to_string();
    let _ = save_settings(&app.config_path, &app.settings);
}
