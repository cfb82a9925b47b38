//! Ratatui console showing live ring health for the loopback demo.

use std::error::Error;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use crossbeam_channel::unbounded;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Wrap};

use crate::StreamStatus;
use crate::control::demo::LoopbackDemo;

const TICK_RATE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct AppState {
    status: Option<StreamStatus>,
    message: Option<String>,
    last_update: Option<Instant>,
}

/// Run the console against a running demo until the user quits.
pub fn run(demo: Arc<LoopbackDemo>) -> Result<(), Box<dyn Error>> {
    setup_terminal()?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (status_tx, status_rx) = unbounded();
    {
        let demo = demo.clone();
        std::thread::spawn(move || {
            loop {
                if status_tx.send(demo.status()).is_err() {
                    break;
                }
                std::thread::sleep(TICK_RATE);
            }
        });
    }

    let mut app = AppState::default();

    loop {
        terminal.draw(|frame| draw(frame, &app))?;

        if let Some(status) = try_recv_latest(&status_rx) {
            app.status = Some(status);
            app.last_update = Some(Instant::now());
        }

        if event::poll(Duration::from_millis(10))? {
            if let CEvent::Key(key) = event::read()? {
                if handle_key(&mut app, &demo, key) {
                    break;
                }
            }
        }
    }

    restore_terminal()?;
    Ok(())
}

fn setup_terminal() -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(())
}

fn restore_terminal() -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn try_recv_latest<T>(rx: &Receiver<T>) -> Option<T> {
    let mut last = None;
    while let Ok(value) = rx.try_recv() {
        last = Some(value);
    }
    last
}

fn handle_key(app: &mut AppState, demo: &LoopbackDemo, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('p') => {
            let paused = demo.toggle_producer();
            app.message = Some(format!(
                "Producer {}",
                if paused { "paused" } else { "resumed" }
            ));
        }
        KeyCode::Char('c') => {
            let paused = demo.toggle_consumer();
            app.message = Some(format!(
                "Consumer {}",
                if paused { "paused" } else { "resumed" }
            ));
        }
        _ => {}
    }
    false
}

fn draw(frame: &mut ratatui::Frame<'_>, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], app);
    draw_fill_gauge(frame, chunks[1], app);
    draw_counters(frame, chunks[2], app);
    draw_footer(frame, chunks[3], app);
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default()
        .title("Loopback Ring Console")
        .borders(Borders::ALL);

    let content = if let Some(status) = &app.status {
        let stats = format!(
            "Sample Rate: {} Hz    Channels: {}    Cycle: {} frames    Latency: {:.2} ms    {}",
            status.sample_rate,
            status.channels,
            status.frames_per_cycle,
            status.latency_ms,
            if status.running { "RUNNING" } else { "STOPPED" },
        );
        Paragraph::new(stats)
    } else {
        Paragraph::new(Line::from(vec![Span::styled(
            "No stream status yet",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )]))
    };

    frame.render_widget(content.block(block), area);
}

fn draw_fill_gauge(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("Ring Fill").borders(Borders::ALL);
    let (ratio, label) = match &app.status {
        Some(status) => (
            f64::from(status.fill.clamp(0.0, 1.0)),
            format!(
                "{} / {} frames ({:.1}%)",
                status.available_frames,
                status.capacity_frames,
                status.fill * 100.0
            ),
        ),
        None => (0.0, String::new()),
    };
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}

fn draw_counters(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("Transport").borders(Borders::ALL);

    if let Some(status) = &app.status {
        let header = Row::new(vec![Cell::from("Counter"), Cell::from("Frames")]).style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

        let rows = vec![
            Row::new(vec![
                Cell::from("Written"),
                Cell::from(format!("{}", status.frames_written)),
            ]),
            Row::new(vec![
                Cell::from("Read"),
                Cell::from(format!("{}", status.frames_read)),
            ]),
            Row::new(vec![
                Cell::from("Overrun (dropped)"),
                Cell::from(format!("{}", status.overrun_frames)),
            ])
            .style(Style::default().fg(if status.overrun_frames > 0 {
                Color::Yellow
            } else {
                Color::Reset
            })),
            Row::new(vec![
                Cell::from("Underrun (silenced)"),
                Cell::from(format!("{}", status.underrun_frames)),
            ])
            .style(Style::default().fg(if status.underrun_frames > 0 {
                Color::Yellow
            } else {
                Color::Reset
            })),
            Row::new(vec![
                Cell::from("Clients"),
                Cell::from(format!("{}", status.clients)),
            ]),
        ];

        let table = Table::new(rows, [Constraint::Length(24), Constraint::Length(16)])
            .header(header)
            .block(block)
            .column_spacing(2);

        frame.render_widget(table, area);
    } else {
        frame.render_widget(Paragraph::new("").block(block), area);
    }
}

fn draw_footer(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let info = "p: Pause/resume producer  •  c: Pause/resume consumer  •  q: Quit";
    let mut lines = vec![Line::from(info)];
    if let Some(message) = &app.message {
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(updated) = app.last_update {
        let ago = updated.elapsed().as_secs_f32();
        lines.push(Line::from(Span::styled(
            format!("Last update {:.1}s ago", ago),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}
