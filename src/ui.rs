use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::client::SubmitOutcome;
use crate::leaderboard::LeaderboardEntry;
use crate::metrics::{CharState, Metrics};
use crate::session::{Clock, Session, SessionStatus};
use crate::stats::UserStats;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_bold() -> Style {
    bold().add_modifier(Modifier::DIM)
}

/// Typing screen: the reference text coloured by correctness plus the clock
pub struct TypingView<'a, C: Clock> {
    pub session: &'a Session<C>,
}

impl<'a, C: Clock> TypingView<'a, C> {
    pub fn new(session: &'a Session<C>) -> Self {
        Self { session }
    }

    fn clock_label(&self) -> String {
        match self.session.seconds_remaining() {
            Some(remaining) => format!("{remaining}"),
            None => format!(
                "{}s  {}/{}",
                self.session.active_secs(),
                self.session.cursor_pos(),
                self.session.reference().chars().count()
            ),
        }
    }

    fn status_line(&self) -> Option<Span<'static>> {
        match self.session.status() {
            SessionStatus::Idle => Some(Span::styled(
                "start typing to begin",
                Style::default().add_modifier(Modifier::ITALIC),
            )),
            SessionStatus::Paused => Some(Span::styled(
                "PAUSED - press any key to continue typing",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::ITALIC),
            )),
            SessionStatus::Active | SessionStatus::Finished => None,
        }
    }

    fn spans(&self) -> Vec<Span<'static>> {
        let green = bold().fg(Color::Green);
        let red = bold().fg(Color::Red);
        let cursor = dim_bold().add_modifier(Modifier::UNDERLINED);
        let cursor_pos = self.session.cursor_pos();
        let typed = self.session.input();

        let mut spans: Vec<Span> = self
            .session
            .reference()
            .chars()
            .zip(self.session.char_states())
            .enumerate()
            .map(|(idx, (expected, state))| match state {
                CharState::Correct => Span::styled(expected.to_string(), green),
                // show what was typed, spaces made visible
                CharState::Incorrect => Span::styled(
                    match typed.get(idx).copied().unwrap_or(expected) {
                        ' ' => "·".to_owned(),
                        c => c.to_string(),
                    },
                    red,
                ),
                CharState::Pending if idx == cursor_pos => Span::styled(expected.to_string(), cursor),
                CharState::Pending => Span::styled(expected.to_string(), dim_bold()),
            })
            .collect();

        // overflow past the end of the reference
        spans.extend(
            typed
                .iter()
                .skip(spans.len())
                .map(|c| Span::styled(c.to_string(), red)),
        );
        spans
    }
}

impl<C: Clock> Widget for TypingView<'_, C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
        let reference_width = self.session.reference().width();

        let prompt_lines = if reference_width <= max_chars_per_line as usize {
            1
        } else {
            (reference_width as f64 / max_chars_per_line as f64).ceil() as u16 + 1
        };
        let padding = area.height.saturating_sub(prompt_lines + 4) / 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(padding),
                Constraint::Length(2),
                Constraint::Length(prompt_lines),
                Constraint::Length(2),
                Constraint::Min(0),
            ])
            .split(area);

        Paragraph::new(Span::styled(self.clock_label(), dim_bold()))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        Paragraph::new(Line::from(self.spans()))
            .alignment(if prompt_lines == 1 {
                Alignment::Center
            } else {
                Alignment::Left
            })
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);

        if let Some(status) = self.status_line() {
            Paragraph::new(status)
                .alignment(Alignment::Center)
                .render(chunks[3], buf);
        }
    }
}

/// Results screen shown after a session finishes
pub struct ResultsView<'a> {
    pub metrics: &'a Metrics,
    pub submit: Option<&'a SubmitOutcome>,
}

impl<'a> ResultsView<'a> {
    pub fn new(metrics: &'a Metrics, submit: Option<&'a SubmitOutcome>) -> Self {
        Self { metrics, submit }
    }

    fn persistence_line(&self) -> String {
        match self.submit {
            None | Some(SubmitOutcome::Skipped) => "log in to save your results".to_string(),
            Some(SubmitOutcome::Saved(Some(stats))) => format!(
                "saved  |  {} tests  avg {} wpm  best {} wpm",
                stats.total_tests, stats.average_wpm, stats.best_wpm
            ),
            Some(SubmitOutcome::Saved(None)) | Some(SubmitOutcome::AlreadySaved) => {
                "saved".to_string()
            }
            Some(SubmitOutcome::Failed) | Some(SubmitOutcome::Cancelled) => {
                "result not saved".to_string()
            }
        }
    }
}

impl Widget for ResultsView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(Span::styled(
            format!("{} wpm   {:.1}% acc", self.metrics.wpm, self.metrics.accuracy),
            bold(),
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        Paragraph::new(Line::from(vec![
            Span::styled(format!("{}", self.metrics.correct_chars), Style::default().fg(Color::Green)),
            Span::raw(" correct / "),
            Span::styled(format!("{}", self.metrics.incorrect_chars), Style::default().fg(Color::Red)),
            Span::raw(" incorrect"),
        ]))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        Paragraph::new(Span::styled(
            self.persistence_line(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[4], buf);

        Paragraph::new(Span::styled(
            "(r)etry / (n)ew / (esc)ape",
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(chunks[6], buf);
    }
}

fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{s}{}", " ".repeat(fill))
}

/// Plain-text rendering of a user's stats
pub fn format_stats(stats: &UserStats) -> String {
    if stats.total_tests == 0 {
        return "no tests yet".to_string();
    }

    let mut out = format!(
        "tests: {}\naverage: {} wpm, {}% acc\nbest: {} wpm, {:.1}% acc\n",
        stats.total_tests,
        stats.average_wpm,
        stats.average_accuracy,
        stats.best_wpm,
        stats.best_accuracy
    );

    if !stats.recent_tests.is_empty() {
        out.push_str("\nrecent:\n");
        for test in &stats.recent_tests {
            out.push_str(&format!(
                "  {}  {:>4} wpm  {:>5.1}%  {} {}\n",
                test.completed_at.format("%Y-%m-%d %H:%M"),
                test.wpm,
                test.accuracy,
                test.mode,
                test.limit
            ));
        }
    }
    out
}

/// Plain-text leaderboard with names padded by display width
pub fn format_leaderboard(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "no results yet".to_string();
    }

    let name_width = entries
        .iter()
        .map(|e| e.name.width())
        .max()
        .unwrap_or_default()
        .max("name".len());

    let mut out = format!(
        "{:>3}  {}  {:>4}  {:>6}  {:>6}  {:>5}\n",
        "#",
        pad("name", name_width),
        "best",
        "avg",
        "acc",
        "tests"
    );
    for (rank, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {}  {:>4}  {:>6.1}  {:>5.1}%  {:>5}\n",
            rank + 1,
            pad(&entry.name, name_width),
            entry.best_wpm,
            entry.average_wpm,
            entry.best_accuracy,
            entry.total_tests
        ));
    }
    out
}
