pub mod history;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget, Wrap},
};
use itertools::Itertools;
use unicode_width::UnicodeWidthStr;

use crate::app::{App, AppState, SessionSummary};
use crate::focal::split_word;
use crate::scheduler::Phase;
use crate::snapshot::Snapshot;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Reading => render_reading(&self.snapshot(), area, buf),
            AppState::Results | AppState::History => match &self.summary {
                Some(summary) => render_results(summary, area, buf),
                None => render_reading(&self.snapshot(), area, buf),
            },
        }
    }
}

fn render_reading(snap: &Snapshot, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let focus_style = Style::default().patch(bold_style).fg(Color::Red);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let word_row = area.height.saturating_sub(VERTICAL_MARGIN * 2 + 4) / 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // status
            Constraint::Length(word_row.saturating_sub(1)),
            Constraint::Length(1), // marker above
            Constraint::Length(1), // word
            Constraint::Length(1), // marker below
            Constraint::Min(0),
            Constraint::Length(1), // progress
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(Span::styled(status_line(snap), dim_style))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let word = &snap.current_token.text;
    let (before, focus, after) = split_word(word, &snap.highlight);
    let line = Line::from(vec![
        Span::styled(before.to_string(), bold_style),
        Span::styled(focus.to_string(), focus_style),
        Span::styled(after.to_string(), bold_style),
    ]);

    let word_area = chunks[3];
    let pivot = word_area.x + word_area.width / 2;
    let lead = pivot_offset(word, snap.highlight.align_index);
    let x = pivot.saturating_sub(lead).max(word_area.x);
    if !word_area.is_empty() {
        buf.set_line(x, word_area.y, &line, word_area.right().saturating_sub(x));
    }

    // fixation guides stay put while words change around them
    for marker_area in [chunks[2], chunks[4]] {
        if marker_area.height > 0 && pivot < marker_area.right() {
            buf.set_string(pivot, marker_area.y, "│", dim_style);
        }
    }

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(snap.progress_fraction.clamp(0.0, 1.0))
        .label(format!(
            "{}/{}  ~{} min left",
            snap.cursor + 1,
            snap.token_count,
            snap.estimated_minutes_remaining
        ));
    gauge.render(chunks[6], buf);

    let legend = match snap.phase {
        Phase::Idle => "(space) start / (tab) highlight / (esc)ape",
        _ => "(space) pause / (↑↓) speed / (←→ h l) seek / (tab) highlight / (esc)ape",
    };
    Paragraph::new(Span::styled(legend, italic_style))
        .alignment(Alignment::Center)
        .render(chunks[7], buf);
}

fn render_results(summary: &SessionSummary, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1), // headline
            Constraint::Length(1), // numbers
            Constraint::Length(1), // record status
            Constraint::Min(1),
            Constraint::Length(1), // legend
        ])
        .split(area);

    let headline = if summary.abandoned {
        Span::styled("stopped early", bold_style.fg(Color::Yellow))
    } else {
        Span::styled("finished", bold_style.fg(Color::Green))
    };
    Paragraph::new(headline)
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    Paragraph::new(Span::styled(results_line(summary), bold_style))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(chunks[2], buf);

    Paragraph::new(Span::styled(
        summary.status.label(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[3], buf);

    Paragraph::new(Span::styled("(r)ead again / (s)tats / (esc)ape", italic_style))
        .render(chunks[5], buf);
}

/// Display columns before the char at `align_index`
pub fn pivot_offset(word: &str, align_index: usize) -> u16 {
    let lead: String = word.chars().take(align_index).collect();
    lead.width() as u16
}

pub fn status_line(snap: &Snapshot) -> String {
    let phase = match snap.phase {
        Phase::Idle => "ready",
        Phase::Playing => "reading",
        Phase::Paused => "paused",
        Phase::Finished => "done",
    };
    [format!("{} wpm", snap.rate), snap.strategy.to_string(), phase.to_string()]
        .iter()
        .join(" · ")
}

pub fn results_line(summary: &SessionSummary) -> String {
    let session = &summary.session;
    format!(
        "{}/{} words · {} active · {:.0} wpm (set {})",
        session.words_read,
        summary.token_count,
        format_secs(session.active_duration_secs),
        session.effective_wpm(),
        session.rate
    )
}

/// `m:ss` for a number of seconds
pub fn format_secs(secs: f64) -> String {
    let whole = secs.max(0.0).round() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}
