//! titan - terminal playground for the TitanCraft router
//!
//! USAGE:
//!   titan                          # interactive playground
//!   titan send "..." [--task math] # one-shot prompt
//!   titan health|version|metrics|improvement-log
//!   titan admin <action>           # freeze, unfreeze, rollback, clear-candidate
//!   titan history [list|clear|remove <id>|resend <id>]
//!   titan config show | set <key> [value]
//!   titan doctor                   # check config, key, network

mod ui;

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use titan::config::{self, ENV_API_KEY, ENV_BASE_URL};
use titan::{
    AdminAction, Config, ConfigStore, Diagnostic, Dispatcher, HistoryStore, PendingDispatch, Rejected,
    ResponseResult, SessionState, Task,
};

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
enum Command {
    Interactive,
    Send { prompt: String, task: Task },
    Diagnostic(Diagnostic),
    Admin(AdminAction),
    History(HistoryCommand),
    ConfigShow,
    ConfigSet { key: String, value: Option<String> },
    Doctor,
    Help,
    Invalid(String),
}

#[derive(Debug, PartialEq)]
enum HistoryCommand {
    List,
    Clear,
    Remove(String),
    Resend(String),
}

fn parse_args(args: Vec<String>) -> Command {
    if args.is_empty() {
        return Command::Interactive;
    }

    let is_help = |a: &String| a == "--help" || a == "-h";
    let first = args[0].as_str();

    // send takes free text, so only a flag right after it means help
    let wants_help = match first {
        "send" => args.get(1).is_some_and(is_help),
        _ => args.iter().any(is_help),
    };
    if wants_help {
        return Command::Help;
    }

    if let Some(diagnostic) = Diagnostic::from_name(first) {
        return Command::Diagnostic(diagnostic);
    }

    match first {
        "doctor" => Command::Doctor,
        "send" => parse_send(&args[1..]),
        "admin" => match args.get(1).and_then(|a| AdminAction::from_name(a)) {
            Some(action) => Command::Admin(action),
            None => Command::Invalid(
                "admin needs one of: freeze, unfreeze, rollback, clear-candidate".into(),
            ),
        },
        "history" => match (args.get(1).map(|s| s.as_str()), args.get(2)) {
            (None, _) | (Some("list"), _) => Command::History(HistoryCommand::List),
            (Some("clear"), _) => Command::History(HistoryCommand::Clear),
            (Some("remove"), Some(id)) => Command::History(HistoryCommand::Remove(id.clone())),
            (Some("resend"), Some(id)) => Command::History(HistoryCommand::Resend(id.clone())),
            _ => Command::Invalid("usage: titan history [list|clear|remove <id>|resend <id>]".into()),
        },
        "config" => match args.get(1).map(|s| s.as_str()) {
            None | Some("show") => Command::ConfigShow,
            Some("set") => match args.get(2) {
                Some(key) => Command::ConfigSet {
                    key: key.clone(),
                    value: args.get(3).cloned(),
                },
                None => Command::Invalid("usage: titan config set <key> [value]".into()),
            },
            Some(other) => Command::Invalid(format!("unknown config command: {}", other)),
        },
        other => Command::Invalid(format!("unknown command: {} (see --help)", other)),
    }
}

fn parse_send(args: &[String]) -> Command {
    let mut task = Task::Auto;
    let mut words = Vec::new();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--task" | "-t" => {
                i += 1;
                match args.get(i).map(|s| s.parse::<Task>()) {
                    Some(Ok(t)) => task = t,
                    Some(Err(e)) => return Command::Invalid(e),
                    None => return Command::Invalid("--task needs a value".into()),
                }
            }
            word => words.push(word.to_string()),
        }
        i += 1;
    }

    Command::Send {
        prompt: words.join(" "),
        task,
    }
}

fn print_help() {
    println!(r#"titan - terminal playground for the TitanCraft router

USAGE:
    titan                              # interactive playground
    titan send <prompt...> [--task T]  # one-shot prompt (T: auto, math, writing, search)
    titan health                       # GET /health
    titan version                      # GET /version
    titan metrics                      # GET /metrics
    titan improvement-log              # GET /improvement-log
    titan admin <action>               # freeze, unfreeze, rollback, clear-candidate
    titan history [list]               # recent prompts
    titan history clear
    titan history remove <id>
    titan history resend <id>
    titan config show
    titan config set base <url>
    titan config set key [value]       # prompts (masked) when value omitted
    titan config set timeout <secs>    # 0 disables the timeout
    titan config set admin-prefix <p>  # e.g. /v1 or /admin
    titan doctor                       # check config, key, network

CONFIG:
    ~/.config/titan/config.json        Base URL, API key, timeout
    ~/.local/state/titan/history.json  Recent prompts (last 10)
    ~/.local/state/titan/titan.log     Log output of the interactive UI

ENVIRONMENT:
    TITAN_BASE_URL                     Override base URL (not saved)
    TITAN_API_KEY                      Override API key (not saved)
    TITAN_LOG                          Log filter, e.g. debug or titan=info

CONTROLS (interactive mode):
    Enter        Send prompt
    Ctrl+T       Cycle task
    F1-F4        Health, version, metrics, improvement log
    F5-F8        Freeze, unfreeze, rollback, clear candidate
    Ctrl+B       Edit base URL (saved)
    Ctrl+K       Edit API key (saved, masked)
    Ctrl+L       Clear
    Tab          Switch tabs
    Esc          Quit
"#);
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    let command = parse_args(std::env::args().skip(1).collect());
    init_logging(command == Command::Interactive)?;

    match command {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Invalid(msg) => anyhow::bail!(msg),
        Command::Interactive => {
            let session = open_session()?;
            ui::run_tui(session).await
        }
        Command::Send { prompt, task } => {
            let mut session = open_session()?;
            let pending = session.send_prompt(&prompt, task);
            run_oneshot(&mut session, pending).await
        }
        Command::Diagnostic(diagnostic) => {
            let mut session = open_session()?;
            let pending = session.run_diagnostic(diagnostic);
            run_oneshot(&mut session, pending).await
        }
        Command::Admin(action) => {
            let mut session = open_session()?;
            let pending = session.admin_action(action);
            run_oneshot(&mut session, pending).await
        }
        Command::History(cmd) => run_history(cmd).await,
        Command::ConfigShow => run_config_show(),
        Command::ConfigSet { key, value } => run_config_set(&key, value),
        Command::Doctor => run_doctor().await,
    }
}

/// Interactive mode logs to a file so output does not land on the TUI
fn init_logging(interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env("TITAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    if interactive {
        let path = config::log_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
    Ok(())
}

/// Doctor should answer quickly even when the configured timeout is long
const DOCTOR_TIMEOUT: Duration = Duration::from_secs(5);

fn open_session() -> Result<SessionState> {
    let session = SessionState::open(ConfigStore::open()?, HistoryStore::open()?);
    Ok(session.with_env_overrides())
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

async fn run_oneshot(
    session: &mut SessionState,
    pending: Result<PendingDispatch, Rejected>,
) -> Result<()> {
    let pending = match pending {
        Ok(p) => p,
        Err(Rejected::CredentialRequired) => {
            anyhow::bail!(
                "Admin calls require an API key. Set {} or run: titan config set key",
                ENV_API_KEY
            );
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} {}{}",
        pending.request().method,
        session.config().base(),
        pending.request().path
    );

    let result = session.settle(pending).await.clone();
    print_result(&result);

    if !result.ok {
        anyhow::bail!("request did not succeed");
    }
    Ok(())
}

fn print_result(result: &ResponseResult) {
    println!("{}\n", result.summary());
    let body = result.body_text();
    if !body.is_empty() {
        println!("{}", body);
    }
}

async fn run_history(cmd: HistoryCommand) -> Result<()> {
    let mut session = open_session()?;

    match cmd {
        HistoryCommand::List => {
            if session.history().is_empty() {
                println!("No requests yet.");
            }
            for item in session.history() {
                let status = item
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "—".into());
                println!(
                    "{}  {}  {:<7}  {:>3}  {}",
                    &item.id[..8.min(item.id.len())],
                    item.timestamp.format("%Y-%m-%d %H:%M"),
                    item.task,
                    status,
                    item.prompt
                );
            }
            Ok(())
        }
        HistoryCommand::Clear => {
            session.clear_history();
            println!("History cleared");
            Ok(())
        }
        HistoryCommand::Remove(prefix) => {
            let id = resolve_id(&session, &prefix)?;
            session.remove_history_item(&id)?;
            println!("Removed {}", id);
            Ok(())
        }
        HistoryCommand::Resend(prefix) => {
            let id = resolve_id(&session, &prefix)?;
            session.load_from_history(&id)?;
            println!("Resending: {} [{}]", session.prompt(), session.task());
            let pending = session.send();
            run_oneshot(&mut session, pending).await
        }
    }
}

/// Accept any unique id prefix, as printed by `history list`
fn resolve_id(session: &SessionState, prefix: &str) -> Result<String> {
    let matches: Vec<_> = session
        .history()
        .iter()
        .filter(|item| item.id.starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [item] => Ok(item.id.clone()),
        [] => Err(Rejected::UnknownHistoryItem(prefix.to_string()).into()),
        _ => anyhow::bail!("Ambiguous id prefix: {}", prefix),
    }
}

fn run_config_show() -> Result<()> {
    let store = ConfigStore::open()?;
    let cfg = store.load();

    println!("Config: {}", store.path().display());
    println!("  base:         {}", cfg.base_url);
    println!("  key:          {}", mask(&cfg.credential));
    println!(
        "  timeout:      {}",
        if cfg.timeout_secs == 0 { "none".to_string() } else { format!("{}s", cfg.timeout_secs) }
    );
    println!("  admin-prefix: {}", cfg.admin_prefix);

    for var in [ENV_BASE_URL, ENV_API_KEY] {
        if std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false) {
            println!("  ({} is set and overrides the stored value)", var);
        }
    }
    Ok(())
}

fn mask(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    match chars.len() {
        0 => "(none)".to_string(),
        n if n <= 4 => "****".to_string(),
        n => format!("****{}", chars[n - 4..].iter().collect::<String>()),
    }
}

fn run_config_set(key: &str, value: Option<String>) -> Result<()> {
    let mut session = open_session()?;

    match key {
        "base" | "base_url" | "url" => {
            let url = value.context("Missing value: titan config set base <url>")?;
            let url = Config::check_base_url(&url)?;
            session.update_config(|cfg| cfg.base_url = url)?;
            println!("Base URL set to: {}", session.stored_config().base_url);
        }
        "key" | "api_key" | "credential" => {
            let key = match value {
                Some(v) => v,
                None => ui::prompt_credential()?,
            };
            session.update_config(|cfg| cfg.credential = key)?;
            if session.stored_config().credential.is_empty() {
                println!("API key cleared");
            } else {
                println!("API key saved to {}", session.config_store().path().display());
            }
        }
        "timeout" | "timeout_secs" => {
            let secs = value
                .context("Missing value: titan config set timeout <secs>")?
                .parse::<u64>()
                .context("Timeout must be a whole number of seconds")?;
            session.update_config(|cfg| cfg.timeout_secs = secs)?;
            println!("Timeout set to: {}s", secs);
        }
        "admin-prefix" | "admin_prefix" => {
            let prefix = value.context("Missing value: titan config set admin-prefix <path>")?;
            if !prefix.starts_with('/') {
                anyhow::bail!("Admin prefix must start with '/'");
            }
            session.update_config(|cfg| cfg.admin_prefix = prefix)?;
            println!("Admin prefix set to: {}", session.stored_config().admin_prefix);
        }
        _ => {
            anyhow::bail!(
                "Unknown config key: {}. Valid keys: base, key, timeout, admin-prefix",
                key
            );
        }
    }
    Ok(())
}

async fn run_doctor() -> Result<()> {
    println!("titan doctor\n");

    let session = open_session()?;
    let config_path = session.config_store().path().to_path_buf();

    println!(
        "[{}] Config: {}",
        if config_path.exists() { "✓" } else { "·" },
        config_path.display()
    );
    println!("[✓] Base URL: {}", session.config().base());
    println!(
        "[{}] API key: {}",
        if session.config().has_credential() { "✓" } else { "·" },
        if session.config().has_credential() { "configured" } else { "none (admin calls disabled)" }
    );
    println!("[✓] History: {} item(s)", session.history().len());

    print!("[?] Network: checking...");
    let result = Dispatcher::new(session.config())
        .with_timeout(Some(DOCTOR_TIMEOUT))
        .get(Diagnostic::Health.path())
        .await;
    match (result.ok, result.status) {
        (true, _) => println!("\r[✓] Network: {}                ", result.summary()),
        (false, Some(_)) => println!("\r[✗] Network: {}                ", result.summary()),
        (false, None) => println!(
            "\r[✗] Network: {}",
            result.error.as_deref().unwrap_or("no response")
        ),
    }

    Ok(())
}
