use crate::runner::{RunnableTask, Runner};
use crate::tasks::TaskStatus;
use anyhow::Result;
use chrono::Local;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use std::collections::HashSet;
use std::io::{self, IsTerminal, Stdout};
use tokio::time::Duration;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct RunOpts {
    pub runner: Runner,
    pub interactive: bool,
}

enum Screen {
    Select,
    Run,
}

enum Outcome {
    Finished,
    Interrupted,
    Cancelled,
    NoneSelected,
}

struct App {
    runner: Runner,
    screen: Screen,
    cursor: usize,
    chosen: HashSet<usize>,
    spinner_tick: usize,
    // interrupt keys are live only on a real terminal outside CI
    interrupts_active: bool,
    list_state: ListState,
}

pub async fn run(opts: RunOpts) -> Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = event_loop(&mut terminal, opts).await;

    disable_raw_mode()?;
    let mut stdout: Stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen)?;

    match res? {
        Outcome::Finished => {}
        Outcome::Interrupted => println!("⚠ Update interrupted by user"),
        Outcome::Cancelled => println!("✨ Update cancelled by user"),
        Outcome::NoneSelected => println!("📌 No tasks selected. Exiting..."),
    }
    Ok(())
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    opts: RunOpts,
) -> Result<Outcome> {
    let screen = if opts.interactive && !opts.runner.tasks().is_empty() {
        Screen::Select
    } else {
        Screen::Run
    };

    let mut app = App {
        runner: opts.runner,
        screen,
        cursor: 0,
        chosen: HashSet::new(),
        spinner_tick: 0,
        interrupts_active: io::stdin().is_terminal() && std::env::var_os("CI").is_none(),
        list_state: ListState::default(),
    };

    loop {
        terminal.draw(|f| draw(f, &mut app))?;
        app.spinner_tick = app.spinner_tick.wrapping_add(1);

        if matches!(app.screen, Screen::Run) {
            app.runner.pump().await;
            if app.runner.should_exit() {
                return Ok(Outcome::Finished);
            }
        }

        let Some(ev) = read_event().await else {
            continue;
        };
        let Event::Key(k) = ev else {
            continue;
        };

        if k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL) {
            match app.screen {
                // cancelling the picker works anywhere raw mode does
                Screen::Select => return Ok(Outcome::Cancelled),
                Screen::Run => {
                    if app.interrupts_active {
                        return Ok(Outcome::Interrupted);
                    }
                }
            }
        }

        if let Screen::Select = app.screen {
            match k.code {
                KeyCode::Up => {
                    app.cursor = app.cursor.saturating_sub(1);
                }
                KeyCode::Down => {
                    if app.cursor + 1 < app.runner.tasks().len() {
                        app.cursor += 1;
                    }
                }
                KeyCode::Char(' ') => {
                    if !app.chosen.remove(&app.cursor) {
                        app.chosen.insert(app.cursor);
                    }
                }
                KeyCode::Enter => match confirm_selection(&app.chosen, app.runner.tasks()) {
                    None => return Ok(Outcome::NoneSelected),
                    Some(names) => {
                        app.runner.apply_selection(&names);
                        app.screen = Screen::Run;
                    }
                },
                _ => {}
            }
        }
    }
}

/// Enter on the select screen. `None` means nothing was chosen: the whole
/// run is cancelled before it starts, and no task runs and no summary is
/// emitted.
fn confirm_selection(chosen: &HashSet<usize>, tasks: &[RunnableTask]) -> Option<HashSet<String>> {
    if chosen.is_empty() {
        return None;
    }
    Some(chosen.iter().map(|&i| tasks[i].name.clone()).collect())
}

fn draw(f: &mut Frame, app: &mut App) {
    match app.screen {
        Screen::Select => draw_select(f, app),
        Screen::Run => draw_run(f, app),
    }
}

fn header() -> Line<'static> {
    Line::from(vec![
        Span::styled(
            "◆ Day Day Up 天天向上",
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", Local::now().format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

fn draw_select(f: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(1)].as_ref())
        .split(f.area());

    let intro = Paragraph::new(vec![
        header(),
        Line::default(),
        Line::from(Span::styled(
            "Select tools to update:",
            Style::default().fg(Color::Gray),
        )),
        Line::from(Span::styled(
            "Space to select • Enter to confirm • Ctrl+C to cancel",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ]);
    f.render_widget(intro, root[0]);

    let items: Vec<ListItem> = app
        .runner
        .tasks()
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let marker = if app.chosen.contains(&i) { "◉" } else { "◯" };
            let label = match &t.description {
                Some(d) => format!("{marker} {} - {d}", t.name),
                None => format!("{marker} {}", t.name),
            };
            ListItem::new(label)
        })
        .collect();

    let list = List::new(items)
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Blue))
        .highlight_symbol("❯ ");

    app.list_state.select(Some(app.cursor));
    f.render_stateful_widget(list, root[1], &mut app.list_state);
}

fn draw_run(f: &mut Frame, app: &mut App) {
    let task_rows = app.runner.tasks().len() as u16;
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Length(task_rows + 1),
                Constraint::Min(1),
            ]
            .as_ref(),
        )
        .split(f.area());

    f.render_widget(Paragraph::new(vec![header()]), root[0]);

    let spinner = SPINNER_FRAMES[app.spinner_tick % SPINNER_FRAMES.len()];
    let task_lines: Vec<Line> = app
        .runner
        .tasks()
        .iter()
        .map(|t| task_line(t.status, &t.name, spinner))
        .collect();
    f.render_widget(Paragraph::new(task_lines), root[1]);

    let live_lines: Vec<Line> = app.runner.live().iter().map(|l| live_line(l)).collect();
    f.render_widget(Paragraph::new(live_lines), root[2]);
}

fn task_line<'a>(status: TaskStatus, name: &'a str, spinner: &'a str) -> Line<'a> {
    let gray = Style::default().fg(Color::Gray);
    let dim = Style::default().fg(Color::DarkGray);
    match status {
        TaskStatus::Pending => Line::from(vec![
            Span::styled("○ ", gray),
            Span::styled(name, gray),
        ]),
        TaskStatus::Running => Line::from(vec![
            Span::styled(format!("{spinner} "), Style::default().fg(Color::Cyan)),
            Span::styled(name, Style::default().fg(Color::White)),
        ]),
        TaskStatus::Completed => Line::from(vec![
            Span::styled("✓ ", Style::default().fg(Color::Green)),
            Span::styled(name, Style::default().fg(Color::White)),
        ]),
        TaskStatus::Failed => Line::from(vec![
            Span::styled("✗ ", Style::default().fg(Color::Red)),
            Span::styled(name, Style::default().fg(Color::White)),
        ]),
        TaskStatus::Skipped => Line::from(vec![
            Span::styled("- ", gray),
            Span::styled(name, gray),
            Span::styled(" (not installed)", dim),
        ]),
        TaskStatus::NotSelected => Line::from(vec![
            Span::styled("⊘ ", gray),
            Span::styled(name, dim.add_modifier(Modifier::CROSSED_OUT)),
            Span::styled(" (skipped)", dim),
        ]),
    }
}

fn live_line(text: &str) -> Line<'_> {
    if text.starts_with('[') && text.ends_with(']') {
        Line::from(Span::styled(
            text,
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        ))
    } else if text.starts_with('✨') {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ))
    } else if text.starts_with('⚠') {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
    } else {
        Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))
    }
}

async fn read_event() -> Option<Event> {
    // poll at 50ms so the runner keeps pumping between keys
    if event::poll(Duration::from_millis(50)).ok()? {
        event::read().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> RunnableTask {
        RunnableTask {
            name: name.to_string(),
            command: "true".to_string(),
            check_command: None,
            description: None,
            status: TaskStatus::Pending,
            output: None,
        }
    }

    #[test]
    fn confirming_nothing_cancels_the_run() {
        let tasks = [task("a"), task("b")];
        assert!(confirm_selection(&HashSet::new(), &tasks).is_none());
    }

    #[test]
    fn confirming_resolves_chosen_indices_to_names() {
        let tasks = [task("a"), task("b"), task("c")];
        let chosen: HashSet<usize> = [0, 2].into();
        let names = confirm_selection(&chosen, &tasks).unwrap();
        let expected: HashSet<String> = ["a".to_string(), "c".to_string()].into();
        assert_eq!(names, expected);
    }
}
