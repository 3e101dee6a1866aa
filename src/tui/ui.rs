//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    style::{Color, Modifier, Style},
};

use super::app::DebuggerApp;
use crate::cpu::Stage;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(frame.area());

    // Left side: program, datapath, status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_listing(frame, left_chunks[0], app);
    draw_datapath(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, output, help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_output(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Program segment around the PC.
fn draw_listing(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = (area.height as usize).saturating_sub(2);

    let items: Vec<ListItem> = app
        .listing_window(rows)
        .into_iter()
        .map(|(idx, text, is_current)| {
            let prefix = if is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(&idx) { "●" } else { " " };

            let style = if is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(&idx) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}{:03}: {}", bp, prefix, idx, text)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Program ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

fn draw_datapath(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cu = &app.cu;
    let flags = cu.flags();
    let value = |v: i64| Span::styled(format!("{:>12}", v), Style::default().fg(Color::White));

    let stage_style = match cu.stage() {
        Stage::Halted => Style::default().fg(Color::Blue),
        Stage::Faulted => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Green),
    };

    let content = vec![
        Line::from(vec![
            Span::raw("Stage: "),
            Span::styled(cu.stage().to_string(), stage_style),
            Span::raw("   PC: "),
            Span::styled(format!("{:03}", cu.pc()), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("ACC:  "),
            value(cu.acc()),
            Span::raw("   N|Z: "),
            Span::raw(format!("{}|{}", u8::from(flags.negative), u8::from(flags.zero))),
        ]),
        Line::from(vec![
            Span::raw("ADDR: "),
            value(cu.address()),
            Span::raw(format!("   ({:#x})", cu.address())),
        ]),
        Line::from(vec![Span::raw("BUS:  "), value(cu.bus())]),
        Line::from(vec![
            Span::raw("Ticks: "),
            Span::styled(cu.tick_count().to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("   Instructions: "),
            Span::styled(cu.instruction_count().to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Datapath ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Every written RAM cell, address order.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let latched = app.cu.address();

    let items: Vec<ListItem> = app
        .cu
        .ram()
        .dump()
        .into_iter()
        .skip(app.mem_scroll)
        .take(visible_rows)
        .map(|(addr, value)| {
            let printable = u32::try_from(value)
                .ok()
                .and_then(char::from_u32)
                .filter(|c| !c.is_control())
                .map(|c| format!(" '{}'", c))
                .unwrap_or_default();
            let text = format!("{:#010x}: {:>12}{}", addr, value, printable);

            let style = if addr == latched {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Memory ({} cells) ", app.cu.ram().len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let left = app.cu.remaining_input().chars().count();
    let output = Paragraph::new(app.cu.output().to_string())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(format!(" Output ({} input left) ", left))
                .borders(Borders::ALL),
        );

    frame.render_widget(output, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("t: Tick  s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}
