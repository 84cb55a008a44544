//! TUI and interactive components
//!
//! Features:
//! - API key prompting
//! - Playground: prompt, task chips, diagnostics, admin actions
//! - Recent prompts with load/remove
//! - Base URL / API key editing
//! - Log tab

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io::{self, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthChar;

use titan::session::{Completion, PendingDispatch, Rejected, Role, SessionState};
use titan::{AdminAction, Config, Diagnostic};

// ═══════════════════════════════════════════════════════════════
// API KEY PROMPT
// ═══════════════════════════════════════════════════════════════

/// Prompt user for the router API key (masked input); empty clears it
pub fn prompt_credential() -> Result<String> {
    print!("Enter X-API-Key (empty to clear): ");
    io::stdout().flush()?;

    // Read with echo disabled
    enable_raw_mode()?;
    let mut key = String::new();

    loop {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match k.code {
                    KeyCode::Enter => break,
                    KeyCode::Char(c) => {
                        key.push(c);
                        print!("*");
                        io::stdout().flush()?;
                    }
                    KeyCode::Backspace => {
                        if key.pop().is_some() {
                            print!("\x08 \x08");
                            io::stdout().flush()?;
                        }
                    }
                    KeyCode::Esc => {
                        disable_raw_mode()?;
                        anyhow::bail!("Cancelled");
                    }
                    _ => {}
                }
            }
        }
    }

    disable_raw_mode()?;
    println!();

    Ok(key)
}

// ═══════════════════════════════════════════════════════════════
// MAIN TUI
// ═══════════════════════════════════════════════════════════════

/// Tab selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Playground,
    History,
    Log,
}

impl Tab {
    fn all() -> &'static [Tab] {
        &[Tab::Playground, Tab::History, Tab::Log]
    }

    fn name(&self) -> &'static str {
        match self {
            Tab::Playground => "Playground",
            Tab::History => "Recent",
            Tab::Log => "Log",
        }
    }
}

/// Lines kept for the Log tab
const LOG_CAP: usize = 200;

/// Connection field being edited in place of the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigField {
    BaseUrl,
    Credential,
}

impl ConfigField {
    fn title(&self) -> &'static str {
        match self {
            ConfigField::BaseUrl => "Base URL",
            ConfigField::Credential => "X-API-Key (empty clears)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigEdit {
    field: ConfigField,
    buffer: String,
}

impl ConfigEdit {
    fn start(field: ConfigField, session: &SessionState) -> Self {
        let buffer = match field {
            ConfigField::BaseUrl => session.stored_config().base_url.clone(),
            ConfigField::Credential => String::new(),
        };
        Self { field, buffer }
    }

    /// What the input box shows; the key is never echoed
    fn display(&self) -> String {
        match self.field {
            ConfigField::BaseUrl => self.buffer.clone(),
            ConfigField::Credential => "*".repeat(self.buffer.chars().count()),
        }
    }
}

/// View state; everything else lives in SessionState
struct TuiState {
    tab: Tab,
    log: Vec<String>,
    notice: Option<String>,
    history_list: ListState,
    editing: Option<ConfigEdit>,
    tick: usize,
}

impl TuiState {
    fn new() -> Self {
        let mut history_list = ListState::default();
        history_list.select(Some(0));
        Self {
            tab: Tab::Playground,
            log: Vec::new(),
            notice: None,
            history_list,
            editing: None,
            tick: 0,
        }
    }

    fn log(&mut self, msg: impl Into<String>) {
        let now = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("[{}] {}", now, msg.into()));
        if self.log.len() > LOG_CAP {
            let excess = self.log.len() - LOG_CAP;
            self.log.drain(..excess);
        }
    }

    fn reject(&mut self, err: Rejected) {
        self.log(format!("Rejected: {}", err));
        self.notice = Some(match err {
            Rejected::CredentialRequired => {
                "Admin calls require X-API-Key (titan config set key)".to_string()
            }
            other => other.to_string(),
        });
    }

    fn clamp_selection(&mut self, len: usize) {
        let selected = self.history_list.selected().unwrap_or(0);
        self.history_list
            .select(Some(selected.min(len.saturating_sub(1))));
    }
}

/// Run the main TUI
pub async fn run_tui(session: SessionState) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_tui_loop(&mut terminal, session).await;
    restore_terminal(terminal)?;
    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut session: SessionState,
) -> Result<()> {
    let mut state = TuiState::new();
    state.log(format!(
        "Router: {} ({})",
        session.config().base(),
        if session.config().has_credential() { "key set" } else { "no key" }
    ));
    state.log(format!("{} recent prompt(s) loaded", session.history().len()));

    let (tx, mut rx) = mpsc::channel::<Completion>(16);

    loop {
        state.tick += 1;

        // Apply finished dispatches
        while let Ok(completion) = rx.try_recv() {
            state.log(format!(
                "{} -> {}",
                completion.intent.label(),
                completion.result.summary()
            ));
            session.complete(completion);
            state.clamp_selection(session.history().len());
        }

        // Render
        terminal.draw(|f| render_tui(f, &session, &mut state))?;

        // Handle input
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Config editing takes all keys until saved or cancelled
        if state.editing.is_some() {
            handle_edit_key(&mut session, &mut state, key.code);
            continue;
        }

        // Global controls
        let dispatch: Option<Result<PendingDispatch, Rejected>> = match key.code {
            KeyCode::Esc => break,
            KeyCode::Tab => {
                let tabs = Tab::all();
                let idx = tabs.iter().position(|t| *t == state.tab).unwrap_or(0);
                state.tab = tabs[(idx + 1) % tabs.len()];
                None
            }
            KeyCode::Char('t') if ctrl => {
                session.set_task(session.task().next());
                None
            }
            KeyCode::Char('l') if ctrl => {
                session.clear();
                state.notice = None;
                None
            }
            KeyCode::Char('b') if ctrl => {
                state.editing = Some(ConfigEdit::start(ConfigField::BaseUrl, &session));
                None
            }
            KeyCode::Char('k') if ctrl => {
                state.editing = Some(ConfigEdit::start(ConfigField::Credential, &session));
                None
            }
            KeyCode::F(n @ 1..=4) => Some(session.run_diagnostic(Diagnostic::all()[n as usize - 1])),
            KeyCode::F(n @ 5..=8) => Some(session.admin_action(AdminAction::all()[n as usize - 5])),
            _ => match state.tab {
                Tab::Playground => handle_playground_key(&mut session, key.code, ctrl),
                Tab::History => {
                    handle_history_key(&mut session, &mut state, key.code);
                    None
                }
                Tab::Log => None,
            },
        };

        match dispatch {
            Some(Ok(pending)) => {
                state.notice = None;
                state.log(format!(
                    "{} {}{}",
                    pending.request().method,
                    session.config().base(),
                    pending.request().path
                ));

                let tx = tx.clone();
                tokio::spawn(async move {
                    let completion = pending.run().await;
                    let _ = tx.send(completion).await;
                });
            }
            Some(Err(err)) => state.reject(err),
            None => {}
        }
    }

    Ok(())
}

fn handle_playground_key(
    session: &mut SessionState,
    code: KeyCode,
    ctrl: bool,
) -> Option<Result<PendingDispatch, Rejected>> {
    match code {
        KeyCode::Enter => return Some(session.send()),
        KeyCode::Char(c) if !ctrl => session.prompt_mut().push(c),
        KeyCode::Backspace => {
            session.prompt_mut().pop();
        }
        _ => {}
    }
    None
}

fn handle_edit_key(session: &mut SessionState, state: &mut TuiState, code: KeyCode) {
    let Some(edit) = state.editing.as_mut() else {
        return;
    };

    match code {
        KeyCode::Esc => state.editing = None,
        KeyCode::Char(c) => edit.buffer.push(c),
        KeyCode::Backspace => {
            edit.buffer.pop();
        }
        KeyCode::Enter => {
            let ConfigEdit { field, buffer } = edit.clone();
            state.editing = None;
            match save_config_edit(session, field, &buffer) {
                Ok(()) => {
                    state.notice = None;
                    state.log(match field {
                        ConfigField::BaseUrl => format!("Base URL set to {}", session.config().base()),
                        ConfigField::Credential if session.config().has_credential() => {
                            "API key saved".to_string()
                        }
                        ConfigField::Credential => "API key cleared".to_string(),
                    });
                }
                Err(err) => {
                    state.log(format!("Config not saved: {:#}", err));
                    state.notice = Some(format!("{:#}", err));
                }
            }
        }
        _ => {}
    }
}

fn save_config_edit(session: &mut SessionState, field: ConfigField, value: &str) -> Result<()> {
    match field {
        ConfigField::BaseUrl => {
            let url = Config::check_base_url(value)?;
            session.update_config(|cfg| cfg.base_url = url)
        }
        ConfigField::Credential => {
            let key = value.to_string();
            session.update_config(|cfg| cfg.credential = key)
        }
    }
}

fn handle_history_key(session: &mut SessionState, state: &mut TuiState, code: KeyCode) {
    let len = session.history().len();
    let selected = state.history_list.selected().unwrap_or(0);
    let selected_id = session.history().get(selected).map(|item| item.id.clone());

    match code {
        KeyCode::Up => state.history_list.select(Some(selected.saturating_sub(1))),
        KeyCode::Down => state
            .history_list
            .select(Some((selected + 1).min(len.saturating_sub(1)))),
        KeyCode::Enter => {
            if let Some(id) = selected_id {
                match session.load_from_history(&id) {
                    Ok(()) => state.tab = Tab::Playground,
                    Err(err) => state.reject(err),
                }
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            if let Some(id) = selected_id {
                if let Err(err) = session.remove_history_item(&id) {
                    state.reject(err);
                }
                state.clamp_selection(session.history().len());
            }
        }
        KeyCode::Char('c') => {
            session.clear_history();
            state.log("Recent prompts cleared");
            state.clamp_selection(0);
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════

fn render_tui(f: &mut Frame, session: &SessionState, state: &mut TuiState) {
    let area = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header + tabs
            Constraint::Min(5),    // Main content
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(area);

    // Header with tabs
    let key_state = if session.config().has_credential() { "key set" } else { "no key" };
    let tabs = Tabs::new(Tab::all().iter().map(|t| t.name()))
        .select(Tab::all().iter().position(|t| *t == state.tab).unwrap_or(0))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title(format!(
            "titan | {} | {}",
            session.config().base(),
            key_state
        )));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        Tab::Playground => render_playground(f, session, state, chunks[1]),
        Tab::History => render_history(f, session, state, chunks[1]),
        Tab::Log => render_log(f, state, chunks[1]),
    }

    // Input with task chips in the title
    let chips: String = titan::Task::all()
        .iter()
        .map(|t| {
            if *t == session.task() {
                format!("[{}]", t)
            } else {
                format!(" {} ", t)
            }
        })
        .collect();
    let input_title = if let Some(edit) = &state.editing {
        format!("{} | Enter: save  Esc: cancel", edit.field.title())
    } else if session.is_dispatching() {
        format!("Sending... | {}", chips)
    } else if session.can_send() {
        format!("Prompt (Enter to send) | {}", chips)
    } else {
        format!("Type a question... | {}", chips)
    };
    let input_style = if state.editing.is_some() {
        Style::default().fg(Color::Yellow)
    } else if session.is_dispatching() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    let input_text = match &state.editing {
        Some(edit) => edit.display(),
        None => session.prompt().to_string(),
    };
    let input = Paragraph::new(input_text)
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input, chunks[2]);

    // Status bar
    let status = format!(
        " {} | ^T task  F1 health F2 version F3 metrics F4 log | F5 freeze F6 unfreeze F7 rollback F8 clear-cand | ^B url ^K key ^L clear  Tab  Esc",
        if session.is_dispatching() { spinner_char(state.tick) } else { ' ' },
    );
    let status = Paragraph::new(status).style(Style::default().fg(Color::DarkGray));
    f.render_widget(status, chunks[3]);
}

fn render_playground(f: &mut Frame, session: &SessionState, state: &TuiState, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    // Transcript
    let mut lines: Vec<Line> = Vec::new();
    for msg in session.transcript() {
        match msg.role {
            Role::User => lines.push(Line::styled(
                format!("> {}", msg.text),
                Style::default().fg(Color::Cyan),
            )),
            Role::Assistant => {
                lines.extend(msg.text.lines().map(|l| Line::raw(format!("  {}", l))));
            }
        }
        lines.push(Line::raw(""));
    }
    if lines.is_empty() {
        lines.push(Line::styled(
            "Type a question, e.g. \"four times five\", and press Enter.",
            Style::default().fg(Color::DarkGray),
        ));
    }
    let transcript = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Transcript"));
    f.render_widget(transcript, halves[0]);

    // Last response
    let (title, body, style) = match (session.last_result(), session.in_flight()) {
        (_, Some(intent)) => (
            format!("Response | {}...", intent.label()),
            String::new(),
            Style::default(),
        ),
        (Some(result), None) => {
            let color = if result.ok { Color::Green } else { Color::Red };
            (
                format!("Response | {}", result.summary()),
                result.body_text(),
                Style::default().fg(color),
            )
        }
        (None, None) => (
            "Response | Status: — | Time: —".to_string(),
            "{\n  \"ok\": true\n}".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };

    let mut text = body;
    if let Some(notice) = &state.notice {
        text = format!("! {}\n\n{}", notice, text);
    }
    let response = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title).title_style(style));
    f.render_widget(response, halves[1]);
}

fn render_history(f: &mut Frame, session: &SessionState, state: &mut TuiState, area: Rect) {
    let width = area.width.saturating_sub(24) as usize;
    let items: Vec<ListItem> = session
        .history()
        .iter()
        .map(|item| {
            let status = item
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "—".into());
            let color = if item.ok { Color::Green } else { Color::Red };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>3} ", status), Style::default().fg(color)),
                Span::styled(format!("{:<8}", item.task), Style::default().fg(Color::DarkGray)),
                Span::raw(fit_width(&item.prompt, width)),
            ]))
        })
        .collect();

    let title = if items.is_empty() {
        "Recent | No requests yet.".to_string()
    } else {
        format!("Recent ({}) | Enter: load  d: remove  c: clear all", items.len())
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut state.history_list);
}

fn render_log(f: &mut Frame, state: &TuiState, area: Rect) {
    let text: String = state.log.iter().rev().take(50).cloned().collect::<Vec<_>>().join("\n");
    let para = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(para, area);
}

/// Cut to a display width, accounting for wide chars
fn fit_width(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    let mut out = String::new();
    let mut used = 0;
    for c in line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            out.push('…');
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

fn spinner_char(tick: usize) -> char {
    const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    SPINNER[tick % SPINNER.len()]
}

// ═══════════════════════════════════════════════════════════════
// TERMINAL SETUP
// ═══════════════════════════════════════════════════════════════

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_width_truncates_wide_chars() {
        assert_eq!(fit_width("hello", 10), "hello");
        assert_eq!(fit_width("hello world", 5), "hello…");
        assert_eq!(fit_width("日本語", 4), "日本…");
        assert_eq!(fit_width("first\nsecond", 20), "first");
    }

    fn session() -> (tempfile::TempDir, SessionState) {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::open(
            titan::ConfigStore::at(dir.path().join("config.json")),
            titan::HistoryStore::at(dir.path().join("history.json")),
        );
        (dir, session)
    }

    fn type_text(session: &mut SessionState, state: &mut TuiState, text: &str) {
        for c in text.chars() {
            handle_edit_key(session, state, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_edit_base_url_saves_through_session() {
        let (dir, mut session) = session();
        let mut state = TuiState::new();

        state.editing = Some(ConfigEdit::start(ConfigField::BaseUrl, &session));
        state.editing.as_mut().unwrap().buffer.clear();
        type_text(&mut session, &mut state, "http://localhost:9000");
        handle_edit_key(&mut session, &mut state, KeyCode::Enter);

        assert!(state.editing.is_none());
        assert_eq!(session.config().base(), "http://localhost:9000");
        let stored = titan::ConfigStore::at(dir.path().join("config.json")).load();
        assert_eq!(stored.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_edit_rejects_bad_url_and_masks_key() {
        let (_dir, mut session) = session();
        let mut state = TuiState::new();

        state.editing = Some(ConfigEdit {
            field: ConfigField::BaseUrl,
            buffer: "localhost".into(),
        });
        handle_edit_key(&mut session, &mut state, KeyCode::Enter);
        assert!(state.notice.is_some());
        assert_eq!(session.config().base_url, titan::config::DEFAULT_BASE_URL);

        state.editing = Some(ConfigEdit::start(ConfigField::Credential, &session));
        type_text(&mut session, &mut state, "secret");
        assert_eq!(state.editing.as_ref().unwrap().display(), "******");
        handle_edit_key(&mut session, &mut state, KeyCode::Esc);
        assert!(state.editing.is_none());
        assert!(!session.config().has_credential());
    }

    #[test]
    fn test_log_is_capped() {
        let mut state = TuiState::new();
        for i in 0..(LOG_CAP + 25) {
            state.log(format!("line {}", i));
        }
        assert_eq!(state.log.len(), LOG_CAP);
        assert!(state.log.last().unwrap().ends_with(&format!("line {}", LOG_CAP + 24)));
        assert!(state.log[0].ends_with("line 25"));
    }

    #[test]
    fn test_tabs_cycle() {
        let names: Vec<_> = Tab::all().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Playground", "Recent", "Log"]);
    }
}
