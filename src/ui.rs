use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, Widget},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::{App, Focus};

const HORIZONTAL_MARGIN: u16 = 2;

pub fn draw(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}

/// The rightmost part of `s` that fits in `width` columns, so the cursor end stays visible.
fn tail_to_width(s: &str, width: usize) -> &str {
    let mut used = 0;
    let mut start = s.len();
    for (idx, c) in s.char_indices().rev() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        start = idx;
    }
    &s[start..]
}

fn input_box<'a>(title: &'a str, value: &'a str, focused: bool, locked: bool, width: u16) -> Paragraph<'a> {
    let border_style = if locked {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };
    let title = if locked {
        format!("{} [LOCKED]", title)
    } else {
        title.to_string()
    };

    // borders and the cursor cell
    let room = width.saturating_sub(3) as usize;
    let mut spans = vec![Span::raw(tail_to_width(value, room).to_string())];
    if focused && !locked {
        spans.push(Span::styled(
            " ",
            Style::default().add_modifier(Modifier::REVERSED),
        ));
    }

    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title),
    )
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints(
                [
                    Constraint::Length(1), // title
                    Constraint::Length(3), // scan field
                    Constraint::Length(3), // notes
                    Constraint::Length(2), // engine status
                    Constraint::Min(3),    // history
                    Constraint::Length(1), // key help
                ]
                .as_ref(),
            )
            .split(area);

        Paragraph::new(Span::styled("scantap", bold_style))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        let field = self.field.borrow();
        input_box(
            "Scan field",
            field.value(),
            self.focus == Focus::ScanField,
            field.is_disabled(),
            chunks[1].width,
        )
        .render(chunks[1], buf);

        input_box(
            "Notes",
            self.notes.value(),
            self.focus == Focus::Notes,
            false,
            chunks[2].width,
        )
        .render(chunks[2], buf);

        let engine = &self.engine;
        let mut flags = Vec::new();
        if engine.is_blocked() {
            flags.push(Span::styled(
                " LOCKOUT ",
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        if engine.is_processing() {
            flags.push(Span::styled(" COOLDOWN ", Style::default().fg(Color::Yellow)));
        }
        let mut summary = vec![Span::styled(
            format!(
                "focus: {} | profile: {} | buffer: {} ",
                self.focus,
                engine.profile(),
                engine.session().len()
            ),
            dim_style,
        )];
        summary.extend(flags);
        let status_style = if engine.is_blocked() {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Green)
        };
        Paragraph::new(vec![
            Line::from(summary),
            Line::from(Span::styled(self.status.as_str(), status_style)),
        ])
        .render(chunks[3], buf);

        let history = self.history.borrow();
        let visible = chunks[4].height.saturating_sub(3) as usize;
        let rows = history
            .records()
            .iter()
            .rev()
            .take(visible)
            .map(|record| {
                Row::new(vec![
                    record.scanned_at.format("%H:%M:%S").to_string(),
                    record.value.clone(),
                    record.profile.clone(),
                    record.completion.clone(),
                    format!("{} ms", record.duration_ms),
                ])
            })
            .collect::<Vec<Row>>();
        let header = Row::new(vec!["Time", "Value", "Profile", "Completion", "Duration"])
            .style(bold_style);
        Table::new(
            rows,
            &[
                Constraint::Length(9),
                Constraint::Min(14),
                Constraint::Length(9),
                Constraint::Length(11),
                Constraint::Length(9),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Scans ({})", history.len())),
        )
        .render(chunks[4], buf);

        Paragraph::new(Span::styled(
            "(F2) focus (F3) export (F4) fast scan (F6) wireless scan (F5) reset (F8) unlock (esc) stop (ctrl+c) quit",
            dim_style.add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[5], buf);
    }
}
