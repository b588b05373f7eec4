//! breachdb: a narrative-gated SQL terminal game.
//!
//! The player types SQL into a virtual terminal to investigate a compromised
//! university network. Every line passes through the authorization engine
//! before it reaches the embedded SQLite world; results are scanned for
//! discoveries, and the story advances from the progress they unlock.
//!
//! # Pipeline
//!
//! ```text
//! input -> authorize (session + progress) -> [block | defer | allow]
//!       -> engine -> observer (progress events, story triggers)
//!       -> narrative (next cutscene or mail)
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Start or resume a game
//! breachdb play --name neo
//!
//! # Run one command against the saved game
//! breachdb exec --connect 174.156.12.4 "SELECT * FROM Firewall"
//!
//! # Completions for a partial line
//! breachdb suggest "SELECT * FROM Us"
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: progress data, engine and session boundaries, the game facade
//! - [`plugins`]: authorization, challenges, observer, narrative, suggestions

pub mod core;
pub mod plugins;

use crate::core::{
    autosave::Autosaver,
    config::{self, ShellConfig},
    error::ShellError,
    game::{Game, Outcome, Response},
    journal::{self, Journal},
    output,
    progress::MessageId,
    store::{self, FileStore},
    tui,
};
use crate::plugins::{catalog, narrative::Action};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default save directory, relative to the working directory.
pub const DEFAULT_ROOT: &str = ".breachdb";

#[derive(Parser, Debug)]
#[clap(
    name = "breachdb",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hack your way through a compromised network, one query at a time"
)]
struct Cli {
    /// Save directory (config, save files and journal).
    #[clap(long, global = true)]
    root: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start or resume the interactive terminal.
    Play {
        /// Your name; only used when the game has none yet.
        #[clap(long)]
        name: Option<String>,
    },
    /// Run one command against the saved game and save the result.
    Exec {
        /// Host to connect to before running the command.
        #[clap(long)]
        connect: Option<String>,
        /// Answer for a credential challenge, if the command raises one.
        #[clap(long)]
        password: Option<String>,
        sql: String,
    },
    /// Print completions for a partial command.
    Suggest { partial: String },
    /// Show progress and session state.
    Status {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Start over. Your name is kept.
    Reset,
}

struct Workspace {
    root: PathBuf,
    config: ShellConfig,
    store: Arc<FileStore>,
}

impl Workspace {
    fn open(root: Option<PathBuf>) -> Result<Self, ShellError> {
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir()?.join(DEFAULT_ROOT),
        };
        let config = config::load_config(&root)?;
        let store = Arc::new(FileStore::new(root.join("save")));
        Ok(Self {
            root,
            config,
            store,
        })
    }

    fn journal(&self) -> Journal {
        if self.config.journal {
            Journal::at(&self.root)
        } else {
            Journal::disabled()
        }
    }

    /// The saved game; a save that fails verification is reported and a
    /// new game starts.
    fn game(&self) -> Result<Game, ShellError> {
        match Game::load(self.store.as_ref(), self.config.clone(), self.journal()) {
            Err(ShellError::Persistence(reason)) => {
                tui::render_notice(&format!(
                    "Saved game could not be loaded ({reason}). Starting a new game."
                ));
                Game::new(self.config.clone(), self.journal())
            }
            other => other,
        }
    }
}

pub fn run() -> Result<(), ShellError> {
    let cli = Cli::parse();
    let workspace = Workspace::open(cli.root)?;

    match cli.command {
        Command::Play { name } => play(&workspace, name),
        Command::Exec {
            connect,
            password,
            sql,
        } => {
            let mut game = workspace.game()?;
            if let Some(host) = connect {
                let response = game.submit(&format!("CONNECT {host}"));
                render_response(&response);
                if !response.outcome.is_success() {
                    return Ok(());
                }
            }
            let mut response = game.submit(&sql);
            let challenge = match response.outcome {
                Outcome::ChallengeRequired(kind) => Some(kind),
                _ => None,
            };
            if let (Some(kind), Some(password)) = (challenge, password) {
                println!("{}", kind.prompt().yellow());
                response = game.resolve_challenge(&password);
            }
            render_response(&response);
            report_save(game.save(workspace.store.as_ref()));
            Ok(())
        }
        Command::Suggest { partial } => {
            let game = workspace.game()?;
            for suggestion in game.suggest(&partial) {
                println!("{}", suggestion.text);
            }
            Ok(())
        }
        Command::Status { format } => {
            let game = workspace.game()?;
            let status = game.status();
            if format == "json" {
                let body = serde_json::to_value(&status)?;
                let envelope = serde_json::json!({
                    "cmd": "status",
                    "status": "ok",
                    "ts": journal::timestamp(),
                    "game": body,
                });
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                println!("{}", "breachdb status".bright_cyan().bold());
                println!(
                    "  player:   {}",
                    status.identity.as_deref().unwrap_or("(unnamed)")
                );
                println!("  story:    {}", status.narrative_cursor);
                let flags: Vec<&str> = status.flags.iter().map(|f| f.as_str()).collect();
                println!("  progress: {}", output::compact_line(&flags.join(", "), 200));
                println!("  unread:   {}", status.unread_mail.len());
            }
            Ok(())
        }
        Command::Reset => {
            let mut game = workspace.game()?;
            game.reset()?;
            store::clear(workspace.store.as_ref())?;
            game.save(workspace.store.as_ref())?;
            println!("{}", "Game reset.".bright_green());
            Ok(())
        }
    }
}

fn report_save(result: Result<(), ShellError>) {
    if let Err(e) = result {
        tui::render_error(&format!("Game not saved: {e}"));
    }
}

fn read_line(prompt: &str) -> Result<Option<String>, ShellError> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn lock(game: &Mutex<Game>) -> Result<std::sync::MutexGuard<'_, Game>, ShellError> {
    game.lock()
        .map_err(|_| ShellError::Persistence("game state lock poisoned".to_string()))
}

fn render_response(response: &Response) {
    for notice in &response.notices {
        tui::render_notice(notice);
    }
    match &response.outcome {
        Outcome::Rows(result) => println!("{}", output::render_table(result)),
        Outcome::Connected(host) => println!("{} {}", "Connected to".bright_green(), host),
        Outcome::Disconnected => println!("{}", "Disconnected.".bright_green()),
        Outcome::LoggedIn { name, permission } => println!(
            "{}",
            format!("Logged in as {name} (permission level {permission}).").bright_green()
        ),
        Outcome::ChallengeRequired(kind) => println!("{}", kind.prompt().yellow()),
        Outcome::Denied(e) | Outcome::EngineError(e) => tui::render_error(&e.to_string()),
    }
    if !response.discoveries.is_empty() {
        println!("{}", "Something in there looks important...".bright_magenta());
    }
}

/// Show whatever the story has queued that was not shown yet.
fn present_story(game: &Mutex<Game>, last: &mut Action) -> Result<(), ShellError> {
    let mut game = lock(game)?;
    let action = game.check_for_progress();
    if action == *last {
        return Ok(());
    }
    *last = action;
    match action {
        Action::None => {}
        Action::PresentCutscene(beat) => {
            tui::render_cutscene(catalog::cutscene_text(beat));
            println!("{}", "(:ack to continue)".dimmed());
        }
        Action::PresentMessage(id) => {
            let from = catalog::message_template(id).from;
            tui::render_notice(&format!("New mail from {from}. Read it with :read {id}"));
        }
    }
    Ok(())
}

fn play(workspace: &Workspace, name: Option<String>) -> Result<(), ShellError> {
    let mut game = workspace.game()?;
    if let Some(name) = name.or_else(|| workspace.config.player.clone()) {
        game.set_identity(&name);
    }
    while game.progress().identity.is_none() {
        match read_line("What's your name? ")? {
            Some(name) => {
                game.set_identity(&name);
            }
            None => return Ok(()),
        }
    }

    tui::render_box(
        "breachdb",
        "Type SQL, or :help for terminal commands.",
        tui::BoxStyle::Info,
    );

    let game = Arc::new(Mutex::new(game));
    let mut autosaver = match workspace.config.autosave_secs {
        0 => None,
        secs => Some(Autosaver::spawn(
            Arc::clone(&game),
            workspace.store.clone(),
            Duration::from_secs(secs),
        )?),
    };

    let mut last = Action::None;
    loop {
        present_story(&game, &mut last)?;
        let prompt = {
            let game = lock(&game)?;
            match game.session().connected_host {
                Some(host) => format!("{}> ", host.to_string().bright_green()),
                None => "> ".to_string(),
            }
        };
        let Some(line) = read_line(&prompt)? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        if let Some(meta) = line.strip_prefix(':') {
            if !meta_command(&game, workspace, meta)? {
                break;
            }
            continue;
        }

        let response = lock(&game)?.submit(&line);
        render_response(&response);
        if let Outcome::ChallengeRequired(_) = response.outcome {
            let answer = read_line("password: ")?;
            let mut game = lock(&game)?;
            match answer.as_deref() {
                None | Some(":cancel") => {
                    game.cancel_challenge();
                    println!("{}", "Cancelled.".dimmed());
                }
                Some(password) => render_response(&game.resolve_challenge(password)),
            }
        }
    }

    if let Some(autosaver) = autosaver.as_mut() {
        autosaver.stop()?;
    }
    report_save(lock(&game)?.save(workspace.store.as_ref()));
    Ok(())
}

/// Returns `false` when the player asked to quit.
fn meta_command(
    game: &Mutex<Game>,
    workspace: &Workspace,
    meta: &str,
) -> Result<bool, ShellError> {
    let (name, arg) = match meta.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (meta, ""),
    };
    let mut game = lock(game)?;
    match name {
        "quit" | "q" => return Ok(false),
        "ack" => match game.pending_cutscene() {
            Some(beat) => game.acknowledge_beat(beat),
            None => println!("{}", "Nothing to acknowledge.".dimmed()),
        },
        "mail" => {
            let mailbox = game.mailbox();
            if mailbox.is_empty() {
                println!("{}", "No mail.".dimmed());
            }
            for (id, read) in mailbox {
                let template = catalog::message_template(id);
                let marker = if read { " " } else { "*" };
                println!(
                    "{marker} {:<12} {:<18} {}",
                    id.as_str(),
                    template.from,
                    template.subject
                );
            }
        }
        "read" => match arg
            .parse::<MessageId>()
            .and_then(|id| game.read_message(id))
        {
            Ok(message) => tui::render_mail(&message),
            Err(e) => tui::render_error(&e.to_string()),
        },
        "cancel" => {
            if !game.cancel_challenge() {
                println!("{}", crate::core::game::NO_PENDING.dimmed());
            }
        }
        "suggest" => {
            let suggestions = game.suggest(arg);
            let texts: Vec<&str> = suggestions.iter().map(|s| s.text.as_str()).collect();
            println!("{}", texts.join("  "));
        }
        "note" if arg.is_empty() => tui::render_error("Usage: :note <text>"),
        "note" => {
            game.add_note(arg);
            println!("{}", "Noted.".dimmed());
        }
        "notes" if arg == "clear" => {
            game.clear_notes();
            println!("{}", "Notepad cleared.".dimmed());
        }
        "notes" if game.notes().is_empty() => println!("{}", "Notepad is empty.".dimmed()),
        "notes" => tui::render_box("notepad", game.notes().trim_end(), tui::BoxStyle::Info),
        "save" => match game.save(workspace.store.as_ref()) {
            Ok(()) => println!("{}", "Saved.".bright_green()),
            Err(e) => tui::render_error(&format!("Game not saved: {e}")),
        },
        "status" => {
            let status = game.status();
            println!(
                "host: {}  user: {}  level: {}  story: {}",
                status.connected_host.as_deref().unwrap_or("-"),
                status.logged_in_as.as_deref().unwrap_or("-"),
                status.permission_level,
                status.narrative_cursor
            );
        }
        "help" => {
            println!(":ack            continue after a cutscene");
            println!(":mail           list your mail");
            println!(":read <id>      read a message");
            println!(":cancel         drop a pending password prompt");
            println!(":suggest <text> completions for a partial command");
            println!(":note <text>    add a line to your notepad");
            println!(":notes [clear]  show or clear the notepad");
            println!(":save           save now");
            println!(":status         session and story state");
            println!(":quit           save and leave");
        }
        other => tui::render_error(&format!("Unknown terminal command ':{other}'. Try :help")),
    }
    Ok(true)
}
