use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::App;
use crate::session::ReadingSession;
use crate::ui::format_secs;

/// Pure presenter for one session row.
/// Effective speed is green when at or above the all-time average.
pub fn present_row(session: &ReadingSession, average_wpm: f64) -> Row<'static> {
    let wpm = session.effective_wpm();
    let wpm_color = if wpm >= average_wpm {
        Color::Green
    } else {
        Color::Yellow
    };

    Row::new(vec![
        Cell::from(session.timestamp.format("%Y-%m-%d %H:%M").to_string())
            .style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(session.words_read.to_string()),
        Cell::from(format_secs(session.active_duration_secs)),
        Cell::from(format!("{wpm:.0}")).style(Style::default().fg(wpm_color)),
        Cell::from(session.rate.to_string()),
        Cell::from(session.source.clone().unwrap_or_else(|| "—".to_string())),
    ])
}

/// Render the reading history screen, newest session first
pub fn render_history(app: &App, f: &mut Frame) {
    let area = f.area();
    let stats = &app.history;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // totals
            Constraint::Min(0),    // sessions table
            Constraint::Length(2), // instructions
        ])
        .split(area);

    let totals = format!(
        "{} sessions · {} words · {} active · {:.0} wpm average",
        stats.sessions.len(),
        stats.total_words,
        format_secs(stats.total_active_secs),
        stats.average_wpm()
    );
    let title = Paragraph::new(totals)
        .block(Block::default().borders(Borders::ALL).title("Reading History"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if stats.is_empty() {
        let no_data = Paragraph::new("No reading sessions recorded yet. Finish a longer read to start your history.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: true });
        f.render_widget(no_data, chunks[1]);
    } else {
        // borders + header
        let table_height = chunks[1].height.saturating_sub(3) as usize;
        let max_scroll = stats.sessions.len().saturating_sub(table_height);
        let scroll = app.history_state.scroll_offset.min(max_scroll);
        let average = stats.average_wpm();

        let header = Row::new(vec![
            Cell::from("Date"),
            Cell::from("Words"),
            Cell::from("Active"),
            Cell::from("WPM"),
            Cell::from("Rate"),
            Cell::from("Source"),
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let rows: Vec<Row> = stats
            .sessions
            .iter()
            .rev()
            .skip(scroll)
            .take(table_height)
            .map(|session| present_row(session, average))
            .collect();

        let widths = [
            Constraint::Length(16),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Min(10),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title("Sessions"))
            .column_spacing(2);
        f.render_widget(table, chunks[1]);
    }

    let instructions = Paragraph::new("(↑/↓) scroll  (PgUp/PgDn) page  (Home/End) jump  (b/esc) back  (r) read again  (q) quit")
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}
