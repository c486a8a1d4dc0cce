mod ui;

use std::{
    fs,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warehouse_core::{
    Position,
    config::SimConfig,
    environment::{Layout, load_layout_from_string},
    session::{Leaderboard, ScoreRecord},
    simulation::Simulation,
};

#[derive(Parser, Debug)]
#[command(version, about = "Warehouse picking agent simulation", long_about = None)]
struct Args {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE", default_value = "maps/warehouse.txt")]
    map: PathBuf,

    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Name recorded on the leaderboard
    #[arg(short, long, default_value = "anonymous")]
    name: String,

    /// Overrides the configured RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Run without the terminal UI and print a summary
    #[arg(long)]
    headless: bool,

    /// Tick limit for headless runs
    #[arg(long, default_value_t = 5000)]
    ticks: u64,

    /// Leaderboard file (JSON)
    #[arg(long, value_name = "FILE", default_value = "leaderboard.json")]
    leaderboard: PathBuf,

    /// Log destination in TUI mode
    #[arg(long, value_name = "FILE", default_value = "warehouse.log")]
    log_file: PathBuf,

    /// Log filter, e.g. `debug` or `warehouse_core=trace`; overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

pub(crate) struct App {
    layout: Layout,
    config: SimConfig,
    player: String,
    /// The current run.
    simulation: Simulation,
    leaderboard: Leaderboard,
    leaderboard_path: PathBuf,
    /// Leaderboard page on screen.
    pub(crate) leaderboard_page: usize,
    /// Index into the waiting customers, left to right.
    selected: usize,
    paused: bool,
    /// The finished run has been written to the leaderboard.
    recorded: bool,
    runs: u64,
    should_quit: bool,
}

impl App {
    fn new(
        layout: Layout,
        config: SimConfig,
        player: String,
        leaderboard_path: PathBuf,
    ) -> Result<Self> {
        let leaderboard = load_leaderboard(&leaderboard_path, config.scoring.leaderboard_capacity)?;
        let simulation = Simulation::start(layout.clone(), &config, player.as_str())?;
        Ok(App {
            layout,
            config,
            player,
            simulation,
            leaderboard,
            leaderboard_path,
            leaderboard_page: 0,
            selected: 0,
            paused: false,
            recorded: false,
            runs: 1,
            should_quit: false,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if self.paused || self.simulation.is_finished() {
            return Ok(());
        }
        let report = self.simulation.step()?;
        if report.outcome.is_some() {
            self.record_run()?;
        }
        Ok(())
    }

    fn record_run(&mut self) -> Result<()> {
        if self.recorded {
            return Ok(());
        }
        self.recorded = true;
        let record = self.simulation.session().final_record();
        if let Some(rank) = self.leaderboard.record(record) {
            info!(rank = rank + 1, "run entered the leaderboard");
        }
        save_leaderboard(&self.leaderboard_path, &self.leaderboard)
    }

    /// Waiting customers ordered left to right.
    pub(crate) fn waiting_customers(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .simulation
            .environment()
            .crowd()
            .customers
            .iter()
            .map(|c| c.position)
            .collect();
        positions.sort_by_key(|p| p.x);
        positions
    }

    pub(crate) fn selected_customer(&self) -> Option<Position> {
        let customers = self.waiting_customers();
        customers.get(self.selected.min(customers.len().saturating_sub(1))).copied()
    }

    fn select_next(&mut self) {
        let count = self.waiting_customers().len();
        if count > 0 {
            self.selected = (self.selected.min(count - 1) + 1) % count;
        }
    }

    fn select_previous(&mut self) {
        let count = self.waiting_customers().len();
        if count > 0 {
            self.selected = (self.selected.min(count - 1) + count - 1) % count;
        }
    }

    fn assign_selected(&mut self) -> Result<()> {
        if self.simulation.is_finished() {
            return Ok(());
        }
        if let Some(customer) = self.selected_customer() {
            self.simulation.assign_target(customer)?;
        }
        Ok(())
    }

    /// Starts a fresh run on the same map once the current one is over.
    fn restart(&mut self) -> Result<()> {
        if !self.simulation.is_finished() {
            return Ok(());
        }
        let config = SimConfig {
            seed: self.config.seed.wrapping_add(self.runs),
            ..self.config.clone()
        };
        self.simulation = Simulation::start(self.layout.clone(), &config, self.player.as_str())?;
        self.runs += 1;
        self.selected = 0;
        self.paused = false;
        self.recorded = false;
        Ok(())
    }

    pub(crate) fn leaderboard_pages(&self) -> usize {
        self.leaderboard.page_count(ui::LEADERBOARD_ROWS)
    }

    fn next_page(&mut self) {
        self.leaderboard_page = (self.leaderboard_page + 1).min(self.leaderboard_pages() - 1);
    }

    fn previous_page(&mut self) {
        self.leaderboard_page = self.leaderboard_page.saturating_sub(1);
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure the map file exists
    if !args.map.exists() {
        return Err(anyhow::anyhow!(
            "Map file does not exist: {}",
            args.map.display()
        ));
    }
    let map_string = fs::read_to_string(&args.map)
        .with_context(|| format!("failed to read map file {}", args.map.display()))?;
    let layout = load_layout_from_string(&map_string)
        .with_context(|| format!("failed to load map {}", args.map.display()))?;

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    init_tracing(&args)?;

    if args.headless {
        return run_headless(&args, layout, &config);
    }

    let mut app = App::new(layout, config, args.name.clone(), args.leaderboard.clone())?;
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    result
}

/// Headless runs log to stderr; the TUI owns the terminal, so it logs to a file.
fn init_tracing(args: &Args) -> Result<()> {
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log filter '{level}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    if args.headless {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        let file = fs::File::create(&args.log_file)
            .with_context(|| format!("failed to create log file {}", args.log_file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

/// Assigns the most impatient waiting customer whenever the agent has no order.
fn auto_dispatch(simulation: &mut Simulation) -> Result<()> {
    if simulation.environment().delivery_target().is_some() {
        return Ok(());
    }
    let next = simulation
        .environment()
        .crowd()
        .customers
        .iter()
        .min_by_key(|c| (c.patience, c.position))
        .map(|c| c.position);
    if let Some(customer) = next {
        simulation.assign_target(customer)?;
    }
    Ok(())
}

fn run_headless(args: &Args, layout: Layout, config: &SimConfig) -> Result<()> {
    let mut simulation = Simulation::start(layout, config, args.name.as_str())?;
    while simulation.tick() < args.ticks {
        auto_dispatch(&mut simulation)?;
        if simulation.step()?.outcome.is_some() {
            break;
        }
    }

    let session = simulation.session();
    let outcome = match simulation.outcome() {
        Some(outcome) => outcome.describe(),
        None => {
            warn!(ticks = args.ticks, "tick limit reached before the run ended");
            "tick limit reached"
        }
    };
    println!(
        "{}: {} after {} ticks | deliveries {} | score {} | reputation {}",
        session.player(),
        outcome,
        simulation.tick(),
        session.deliveries(),
        session.score(),
        session.reputation(),
    );

    let mut leaderboard = load_leaderboard(&args.leaderboard, config.scoring.leaderboard_capacity)?;
    if let Some(rank) = leaderboard.record(session.final_record()) {
        info!(rank = rank + 1, "run entered the leaderboard");
    }
    save_leaderboard(&args.leaderboard, &leaderboard)
}

/// A missing file is an empty leaderboard.
fn load_leaderboard(path: &Path, capacity: usize) -> Result<Leaderboard> {
    if !path.exists() {
        return Ok(Leaderboard::new(capacity));
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read leaderboard {}", path.display()))?;
    let records: Vec<ScoreRecord> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse leaderboard {}", path.display()))?;
    Ok(Leaderboard::from_records(records, capacity))
}

fn save_leaderboard(path: &Path, leaderboard: &Leaderboard) -> Result<()> {
    let json = serde_json::to_string_pretty(leaderboard.entries())?;
    fs::write(path, json)
        .with_context(|| format!("failed to write leaderboard {}", path.display()))
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(150);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char('p') => app.toggle_pause(),
                    KeyCode::Left => app.select_previous(),
                    KeyCode::Right => app.select_next(),
                    KeyCode::Enter => app.assign_selected()?,
                    KeyCode::PageDown => app.next_page(),
                    KeyCode::PageUp => app.previous_page(),
                    KeyCode::Char(' ') => app.restart()?,
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = "ST S1 DP";

    fn app_with_scores(count: u64) -> App {
        let layout = load_layout_from_string(MAP).unwrap();
        let path = std::env::temp_dir().join("warehouse-paging-test-missing.json");
        let mut app = App::new(layout, SimConfig::default(), "tester".into(), path).unwrap();
        for score in 0..count {
            app.leaderboard.record(ScoreRecord {
                name: format!("run{score}"),
                score,
                deliveries: 0,
            });
        }
        app
    }

    #[test]
    fn leaderboard_pages_clamp_at_both_ends() {
        let mut app = app_with_scores(25);
        assert_eq!(app.leaderboard_pages(), 3);

        app.previous_page();
        assert_eq!(app.leaderboard_page, 0);
        for _ in 0..5 {
            app.next_page();
        }
        assert_eq!(app.leaderboard_page, 2);
        assert_eq!(app.leaderboard.page(app.leaderboard_page, ui::LEADERBOARD_ROWS).len(), 5);
    }

    #[test]
    fn empty_leaderboard_has_one_page() {
        let mut app = app_with_scores(0);
        app.next_page();
        assert_eq!(app.leaderboard_page, 0);
    }
}
