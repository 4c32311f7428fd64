//! UI rendering for course catalog.

use crate::app::{App, Screen};
use crate::form::{FieldKind, Form};
use content_tree::{Content, Level};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);

    match app.screen() {
        Screen::Detail { .. } => draw_detail(f, app, chunks[1]),
        _ => draw_list(f, app, chunks[1]),
    }

    draw_status_bar(f, app, chunks[2]);

    if let Some(form) = &app.form {
        draw_form(f, form);
    }

    if let Some(confirm) = &app.confirm {
        draw_confirm(f, &confirm.prompt);
    }

    if app.show_help {
        draw_help(f);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let header = Paragraph::new(app.breadcrumb())
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title(" Course Catalog "));
    f.render_widget(header, area);
}

fn minutes(total: i64) -> String {
    format!("{total} min")
}

fn list_rows(app: &App) -> Vec<String> {
    let show_totals = app.config.display.show_totals;
    match app.screen() {
        Screen::Levels => Level::ALL.iter().map(|l| l.label().to_string()).collect(),
        Screen::Roots { level } => app
            .roots
            .iter()
            .map(|s| {
                let mut row = format!("{}  [{}]  {}", s.name, s.category, s.tutor.name);
                if show_totals && !level.has_terms() {
                    row.push_str(&format!("  ({})", minutes(s.total_time)));
                }
                row
            })
            .collect(),
        Screen::Terms { .. } => app
            .terms
            .iter()
            .map(|t| {
                if show_totals {
                    format!("{}  ({})", t.name, minutes(t.total_time))
                } else {
                    t.name.clone()
                }
            })
            .collect(),
        Screen::Chapters { .. } => app
            .chapters
            .iter()
            .map(|c| match &c.week {
                Some(week) => format!("{:>3}. {}  (week {week})", c.position, c.name),
                None => format!("{:>3}. {}", c.position, c.name),
            })
            .collect(),
        Screen::Contents { .. } => app
            .contents
            .iter()
            .map(|c| format!("{:>3}. [{}] {}  {}", c.position, c.content_type.name(), c.topic_name, c.timeframe))
            .collect(),
        Screen::Detail { .. } => Vec::new(),
    }
}

fn empty_hint(screen: &Screen) -> &'static str {
    match screen {
        Screen::Roots { .. } | Screen::Chapters { .. } | Screen::Contents { .. } => {
            "Nothing here yet. Press a to add."
        }
        _ => "Nothing here yet.",
    }
}

fn draw_list(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.screen().title()));

    let rows = list_rows(app);
    if rows.is_empty() {
        let hint = Paragraph::new(empty_hint(app.screen()))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(hint, area);
        return;
    }

    let items: Vec<ListItem> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let style = if i == app.selected_index {
                Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(row).style(style)
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

fn detail_lines(content: &Content) -> Vec<Line<'_>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(Span::styled(content.topic_name.as_str(), bold)),
        Line::from(format!("Type:      {}", content.content_type.name())),
        Line::from(format!("Timeframe: {} ({})", content.timeframe, minutes(content.minutes().into()))),
        Line::from(format!("Position:  {}", content.position)),
    ];

    if content.content_type.is_media() {
        if let Some(url) = &content.content_url {
            lines.push(Line::from(format!("File:      {url}")));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("o to open", Style::default().fg(Color::DarkGray))));
        return lines;
    }

    for (i, question) in content.questions.iter().enumerate() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!("{}. {}", i + 1, question.question_text), bold)));
        if let Some(image) = &question.image {
            lines.push(Line::from(format!("   image: {image}")));
        }
        for answer in &question.answers {
            let (mark, style) = if answer.is_correct {
                ("*", Style::default().fg(Color::Green))
            } else {
                (" ", Style::default())
            };
            lines.push(Line::from(Span::styled(format!("  {mark} {}", answer.text), style)));
        }
    }
    lines
}

fn draw_detail(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Content ");
    let mut lines = match &app.detail {
        Some(content) => detail_lines(content),
        None => vec![Line::from("Content not found")],
    };
    if let Some(request) = &app.media {
        lines.push(Line::from(Span::styled(
            format!("Sent to viewer: {} {}", request.content_type.name(), request.url),
            Style::default().fg(Color::Green),
        )));
    }
    let detail = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(detail, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    let total = app
        .total_time
        .map(|t| format!("Total: {}", minutes(t)))
        .unwrap_or_default();
    let total_widget = Paragraph::new(total).block(Block::default().borders(Borders::ALL));
    f.render_widget(total_widget, chunks[0]);

    let msg = app.message.clone().unwrap_or_else(|| "? for help | q to quit".to_string());
    let msg_widget = Paragraph::new(msg).block(Block::default().borders(Borders::ALL));
    f.render_widget(msg_widget, chunks[1]);
}

fn draw_form(f: &mut Frame, form: &Form) {
    let height = (form.fields.len() as u16 + 4).min(f.area().height);
    let area = centered_fixed(70, height, f.area());
    f.render_widget(Clear, area);

    let mut lines: Vec<Line> = form
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let label = if field.label == "File" { form.file_label() } else { field.label };
            let value = match field.kind {
                FieldKind::Choice(_) => format!("< {} >", field.value),
                _ => field.value.clone(),
            };
            let style = if i == form.focus {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{label:>18}: "), style.add_modifier(Modifier::BOLD)),
                Span::styled(value, style),
            ])
        })
        .collect();

    lines.push(Line::from(match &form.error {
        Some(error) => Span::styled(error.clone(), Style::default().fg(Color::Red)),
        None => Span::styled("Tab next | Enter save | Esc cancel", Style::default().fg(Color::DarkGray)),
    }));

    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(form.title.as_str()));
    f.render_widget(widget, area);
}

fn draw_confirm(f: &mut Frame, prompt: &str) {
    let area = centered_fixed(60, 3, f.area());
    f.render_widget(Clear, area);
    let widget = Paragraph::new(prompt)
        .style(Style::default().fg(Color::Red))
        .block(Block::default().borders(Borders::ALL).title(" Confirm "));
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let help_text = vec![
        Line::from(Span::styled("Navigation", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  j/k or arrows  Move selection"),
        Line::from("  g/G            Go to first/last"),
        Line::from("  Enter / l      Open"),
        Line::from("  Esc / h        Back"),
        Line::from(""),
        Line::from(Span::styled("Actions", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  a              Add subject, chapter or content"),
        Line::from("  e              Edit"),
        Line::from("  d              Delete"),
        Line::from("  o              Open pdf or video"),
        Line::from("  r              Rebuild total time"),
        Line::from(""),
        Line::from("  q              Quit"),
    ];

    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title(" Help "));
    f.render_widget(help, area);
}

fn centered_fixed(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
