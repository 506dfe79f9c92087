use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Wrap},
    Frame,
};

use ncmeter::log::{format_real, CSV_HEADER};

use super::app::{AppState, Field, UiMode};
use super::theme::Theme;

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub fn draw(f: &mut Frame, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(8),
            Constraint::Length(1),
        ])
        .split(f.size());

    draw_inputs(f, chunks[0], app);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Theme::gauge())
        .percent(u16::from(app.session.progress().min(100)));
    f.render_widget(gauge, chunks[1]);

    draw_table(f, chunks[2], app);
    draw_activity(f, chunks[3], app);
    draw_status(f, chunks[4], app);

    if let UiMode::Editing(Field::Export) = app.ui_mode {
        let area = centered_rect(60, 20, f.size());
        let p = Paragraph::new(Line::from(Span::styled(
            format!("{}_", app.export_path),
            Theme::input(true),
        )))
        .block(Block::default().borders(Borders::ALL).title(Field::Export.label()));
        f.render_widget(Clear, area);
        f.render_widget(p, area);
    }
    if app.ui_mode == UiMode::Help {
        let area = centered_rect(60, 40, f.size());
        let lines = vec![
            Line::from("Tab/↓ next field | Enter edit field | i address | p port | f file"),
            Line::from("s send | r receive | c clear data | e export CSV"),
            Line::from("Esc cancels an edit | q quit | any key closes this help"),
        ];
        let w = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
        f.render_widget(Clear, area);
        f.render_widget(w, area);
    }
    if let Some(err) = &app.error {
        let area = centered_rect(60, 25, f.size());
        let w = Paragraph::new(Line::from(Span::styled(err.clone(), Theme::error())))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Error"));
        f.render_widget(Clear, area);
        f.render_widget(w, area);
    }
}

fn draw_inputs(f: &mut Frame, area: Rect, app: &AppState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(24),
            Constraint::Length(12),
            Constraint::Min(20),
        ])
        .split(area);
    for (field, rect) in [Field::Host, Field::Port, Field::File].into_iter().zip(cols.iter()) {
        let editing = app.ui_mode == UiMode::Editing(field);
        let mut text = app.field_value(field).to_string();
        if editing {
            text.push('_');
        } else if field == Field::File && text.is_empty() {
            text = "None".to_string();
        }
        let title = Span::styled(field.label(), Theme::header(app.focus == field));
        let p = Paragraph::new(Line::from(Span::styled(text, Theme::input(editing))))
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(p, *rect);
    }
}

fn draw_table(f: &mut Frame, area: Rect, app: &AppState) {
    let records = app.session.log().records();
    // Keep the newest rows visible
    let visible = area.height.saturating_sub(3) as usize;
    let skip = records.len().saturating_sub(visible);
    let last = records.len().saturating_sub(1);
    let rows: Vec<Row> = records
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, r)| {
            let style = if i == last { Theme::latest_row() } else { Theme::row() };
            Row::new(vec![
                Cell::from(r.time_label()),
                Cell::from(r.byte_count().to_string()),
                Cell::from(format_real(r.throughput_kbps())),
                Cell::from(format_real(f64::from(r.cpu_percent()))),
            ])
            .style(style)
        })
        .collect();
    let header = Row::new(CSV_HEADER.iter().map(|h| Cell::from(*h))).style(Theme::table_header());
    let title = format!(
        "Transfers ({}, {} bytes total)",
        records.len(),
        app.session.log().total_bytes()
    );
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(20),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
            Constraint::Percentage(20),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn draw_activity(f: &mut Frame, area: Rect, app: &AppState) {
    let max_lines = area.height.saturating_sub(2) as usize;
    let start = app.activity.len().saturating_sub(max_lines);
    let lines: Vec<Line> = app
        .activity
        .iter()
        .skip(start)
        .map(|l| Line::from(Span::styled(l.clone(), Theme::activity())))
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Activity"));
    f.render_widget(p, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &AppState) {
    let spinner = if app.session.has_in_flight() {
        SPINNER[app.spinner_idx % SPINNER.len()]
    } else {
        ' '
    };
    let msg = match &app.toast {
        Some((t, _)) => t.as_str(),
        None => app.status.as_str(),
    };
    let line = Line::from(vec![
        Span::styled(format!("{} {}", spinner, msg), Theme::status()),
        Span::styled("   h help | q quit", Theme::hint()),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
