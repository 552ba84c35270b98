//! tuneboy - A polyphonic toy synthesizer for the terminal.
//!
//! Play notes from the computer keyboard, place them on a step-sequencer
//! grid and loop the grid at a chosen tempo.
//!
//! # Usage
//!
//! ```bash
//! cargo run                                 # Play, loading sequence.json if present
//! cargo run -- play song.json               # Play with a specific sequence file
//! cargo run -- export song.json song.wav    # Bounce one grid cycle to WAV
//! ```

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::style::Print;
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use std::collections::HashSet;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tuneboy::audio::output::AudioOutput;
use tuneboy::keymap::note_for_key;
use tuneboy::sequencer::Sequence;
use tuneboy::{
    export_to_wav, Engine, EngineConfig, NoteId, SequencerEvent, SoundEffect, VoiceBank,
};

/// Sequence file used when none is given.
const DEFAULT_SEQUENCE_PATH: &str = "sequence.json";

/// What to do.
enum Command {
    /// Interactive keyboard and sequencer.
    Play { file: Option<PathBuf> },
    /// Render a sequence file to WAV without opening the audio device.
    Export { file: PathBuf, output: PathBuf },
}

/// Command-line options for the application.
struct CliOptions {
    command: Command,
    /// Path to a JSON engine configuration.
    config: Option<PathBuf>,
    /// Starting tempo override.
    bpm: Option<u32>,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `play [FILE]`: Interactive mode (the default)
    /// - `export FILE OUT.wav`: Offline bounce
    /// - `--config <path>` or `-c <path>`: Engine configuration file
    /// - `--bpm <n>` or `-b <n>`: Starting tempo
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut config: Option<PathBuf> = None;
        let mut bpm: Option<u32> = None;
        let mut positional: Vec<String> = Vec::new();
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    if i >= args.len() {
                        eprintln!("Error: --config requires a path argument");
                        std::process::exit(1);
                    }
                    config = Some(PathBuf::from(&args[i]));
                }
                "--bpm" | "-b" => {
                    i += 1;
                    let value = args
                        .get(i)
                        .context("--bpm requires a number")?
                        .parse()
                        .context("--bpm must be a whole number")?;
                    bpm = Some(value);
                }
                "--help" | "-h" => {
                    print_help(args.first().map(String::as_str).unwrap_or("tuneboy"));
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => positional.push(other.to_string()),
            }
            i += 1;
        }

        let command = match positional.first().map(String::as_str) {
            None => Command::Play { file: None },
            Some("play") => Command::Play {
                file: positional.get(1).map(PathBuf::from),
            },
            Some("export") => match (positional.get(1), positional.get(2)) {
                (Some(file), Some(output)) => Command::Export {
                    file: PathBuf::from(file),
                    output: PathBuf::from(output),
                },
                _ => {
                    eprintln!("Error: export requires FILE and OUT.wav");
                    std::process::exit(1);
                }
            },
            // A bare sequence file means play it
            Some(file) if file.ends_with(".json") => Command::Play {
                file: Some(PathBuf::from(file)),
            },
            Some(other) => {
                eprintln!("Unknown command: {}", other);
                eprintln!("Use --help for usage information");
                std::process::exit(1);
            }
        };

        Ok(Self {
            command,
            config,
            bpm,
        })
    }
}

fn print_help(program: &str) {
    eprintln!("tuneboy - Polyphonic toy synthesizer");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] [play [FILE] | export FILE OUT.wav]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH  Load engine settings from a JSON file");
    eprintln!("  -b, --bpm N        Starting tempo");
    eprintln!("  -h, --help         Print this help message");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  z s x d c v g b h n j m   C3..B3");
    eprintln!("  q 2 w 3 e r 5 t 6 y 7 u   C4..B4, then i 9 o 0 p up to E5");
    eprintln!("  Space     Start/stop the sequencer");
    eprintln!("  [ ]       Tempo down/up");
    eprintln!("  Left/Right Move the playhead");
    eprintln!("  Enter     Place the last note at the playhead");
    eprintln!("  Backspace Remove the last note at the playhead");
    eprintln!("  Tab       Next instrument");
    eprintln!("  \\         Toggle sustain");
    eprintln!("  Ctrl+S    Save the sequence");
    eprintln!("  Esc       Quit");
}

/// Main entry point.
fn main() -> Result<()> {
    // Parse CLI options first (before any terminal setup)
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(bpm) = cli.bpm {
        config.tempo.default = bpm;
    }

    match cli.command {
        Command::Export { file, output } => export_sequence(&config, &file, &output),
        Command::Play { file } => {
            let path = file.unwrap_or_else(|| PathBuf::from(DEFAULT_SEQUENCE_PATH));
            play(config, path)
        }
    }
}

/// Renders `file` to `output` at the configured tempo.
fn export_sequence(config: &EngineConfig, file: &Path, output: &Path) -> Result<()> {
    let sequence = Sequence::load_from_file(file, config.layout())
        .with_context(|| format!("Failed to load sequence: {}", file.display()))?;
    let bank = VoiceBank::build(
        config.instruments.iter().map(String::as_str),
        NoteId::all(),
        config.bank_settings(),
    )
    .context("Failed to build voice bank")?;
    let tempo = config.tempo.clamp(config.tempo.default);

    export_to_wav(
        &sequence,
        &bank,
        tempo,
        config.grid_width,
        output,
        Some(|progress: f32| eprint!("\rExporting... {:>3.0}%", progress * 100.0)),
    )?;
    eprintln!();
    eprintln!("Exported to {}", output.display());
    Ok(())
}

/// Opens the audio device and runs the interactive front end.
fn play(config: EngineConfig, path: PathBuf) -> Result<()> {
    let output = AudioOutput::open_default(config.channels, config.sample_rate)
        .context("Failed to open audio output")?;
    let engine = Engine::new(config, output.mixer()).context("Failed to initialize synthesizer")?;

    let mut session = Session::new(path);
    if session.path.exists() {
        match engine.load_sequence(&session.path) {
            Ok(events) => session.status = format!("Loaded {} notes", events),
            Err(e) => session.status = format!("Could not load sequence: {}", e),
        }
    }

    let mut stdout = io::stdout();
    session.releases = setup_terminal(&mut stdout).context("Failed to setup terminal")?;
    let result = run_app(&mut stdout, &engine, &mut session);
    restore_terminal(&mut stdout, session.releases)?;

    engine.stop();
    result
}

/// Front-end state that is not part of the engine.
struct Session {
    /// Where Ctrl+S saves.
    path: PathBuf,
    /// Whether the terminal reports key releases.
    releases: bool,
    /// Keys currently down (only with release reporting).
    held: HashSet<NoteId>,
    /// Most recently played note, for placing on the grid.
    last_note: Option<NoteId>,
    status: String,
    /// Drives the typing sound of status messages.
    typed: usize,
}

impl Session {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            releases: false,
            held: HashSet::new(),
            last_note: None,
            status: String::new(),
            typed: 0,
        }
    }

    fn set_status(&mut self, engine: &Engine, status: impl Into<String>) {
        self.status = status.into();
        engine.play_effect(SoundEffect::Type(self.typed));
        self.typed += 1;
    }
}

/// Sets up the terminal for raw key input.
///
/// # Returns
///
/// Whether key release events will be reported.
fn setup_terminal(stdout: &mut Stdout) -> Result<bool> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen, Hide).context("Failed to enter alternate screen")?;

    let releases = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
    if releases {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )
        .context("Failed to enable key release events")?;
    } else {
        tracing::debug!("terminal does not report key releases, notes will be bounded");
    }
    Ok(releases)
}

/// Restores the terminal to its original state.
fn restore_terminal(stdout: &mut Stdout, releases: bool) -> Result<()> {
    if releases {
        execute!(stdout, PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(stdout, Show, LeaveAlternateScreen).context("Failed to leave alternate screen")?;
    Ok(())
}

/// Main application loop.
fn run_app(stdout: &mut Stdout, engine: &Engine, session: &mut Session) -> Result<()> {
    loop {
        draw(stdout, engine, session)?;

        // Short timeout keeps the playhead display moving
        if event::poll(Duration::from_millis(33))? {
            if let Event::Key(key) = event::read()? {
                if !handle_key(engine, session, key) {
                    return Ok(());
                }
            }
        }
    }
}

fn draw(stdout: &mut Stdout, engine: &Engine, session: &Session) -> Result<()> {
    let state = if engine.is_running() { "playing" } else { "stopped" };
    let held: Vec<&str> = engine.active_notes().into_iter().map(NoteId::name).collect();
    let lines = [
        format!(
            "tuneboy  {}  {} BPM  step {}/{}",
            state,
            engine.tempo(),
            engine.playhead() + 1,
            engine.grid_width()
        ),
        format!(
            "instrument: {}  sustain: {}",
            engine.current_instrument(),
            if engine.sustain() { "on" } else { "off" }
        ),
        format!("held: {}", held.join(" ")),
        format!(
            "grid: {} notes  last: {}  file: {}",
            engine.sequence().len(),
            session.last_note.map(NoteId::name).unwrap_or("-"),
            session.path.display()
        ),
        String::new(),
        session.status.clone(),
    ];

    for (row, line) in lines.iter().enumerate() {
        queue!(
            stdout,
            MoveTo(0, row as u16),
            Clear(ClearType::CurrentLine),
            Print(line)
        )?;
    }
    stdout.flush()?;
    Ok(())
}

/// Handles one key event.
///
/// # Returns
///
/// false when the user asked to quit
fn handle_key(engine: &Engine, session: &mut Session, key: KeyEvent) -> bool {
    match key.kind {
        KeyEventKind::Release => {
            if let KeyCode::Char(c) = key.code {
                if let Some(note) = note_for_key(c) {
                    if session.held.remove(&note) {
                        engine.stop_note(note);
                    }
                }
            }
            return true;
        }
        KeyEventKind::Repeat => return true,
        _ => {}
    }

    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return false,
        KeyCode::Char('c') if control => return false,
        KeyCode::Char('s') if control => match engine.save_sequence(&session.path) {
            Ok(()) => {
                let status = format!("Saved to {}", session.path.display());
                session.set_status(engine, status);
            }
            Err(e) => {
                tracing::error!("Save failed: {:?}", e);
                session.set_status(engine, format!("Save failed: {}", e));
            }
        },
        KeyCode::Char(' ') => {
            if engine.is_running() {
                engine.stop();
                session.held.clear();
            } else {
                engine.start();
            }
        }
        KeyCode::Char('[') => {
            engine.nudge_tempo(-1);
        }
        KeyCode::Char(']') => {
            engine.nudge_tempo(1);
        }
        KeyCode::Char('\\') => {
            let sustain = engine.toggle_sustain();
            session.set_status(engine, if sustain { "Sustain on" } else { "Sustain off" });
        }
        KeyCode::Tab => {
            engine.cycle_instrument();
            engine.play_effect(SoundEffect::Hover);
        }
        KeyCode::Left => {
            let width = engine.grid_width();
            engine.set_playhead((engine.playhead() + width - 1) % width);
        }
        KeyCode::Right => {
            engine.set_playhead(engine.playhead() + 1);
        }
        KeyCode::Enter => {
            if let Some(note) = session.last_note {
                let instrument = engine.current_instrument();
                engine.add_event(SequencerEvent::new(note, instrument, engine.playhead(), 1));
                engine.preview_note(note, None);
            }
        }
        KeyCode::Backspace | KeyCode::Delete => {
            if let Some(note) = session.last_note {
                engine.remove_at(note, engine.playhead());
            }
        }
        KeyCode::Char(c) => {
            if let Some(note) = note_for_key(c) {
                session.last_note = Some(note);
                if session.releases {
                    if session.held.insert(note) {
                        engine.play_note(note, None, None);
                    }
                } else {
                    // No release events: bound the note instead of holding it
                    engine.play_note(note, None, Some(engine.config().preview()));
                }
            }
        }
        _ => {}
    }
    true
}
