use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use tripmatch_core::config::{Config, StorageBackend};
use tripmatch_core::evaluation::{histogram, EvaluationSummary};
use tripmatch_core::export_data;
use tripmatch_core::logs;
use tripmatch_core::map_server::MapServer;
use tripmatch_core::osrm::OsrmClient;
use tripmatch_core::session::{AccessGate, ExplorerSession, TripView};
use tripmatch_core::storage;

#[derive(Parser)]
#[command(name = "trip_explorer", about = "Compare map-matched trip distances with the odometer")]
struct Cli {
    /// JSON config file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read the tables from this directory instead of the configured storage
    #[arg(long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Step through every cycle (n/p to move, e to export GPX, q to quit)
    Browse,
    /// Show the trip sequence of a vehicle and one of its trips
    Vehicle {
        /// Vehicle model; lists the models when omitted
        #[arg(short, long)]
        model: Option<String>,
        /// 1-based trip number in the sequence
        #[arg(short, long, default_value_t = 1)]
        trip: usize,
    },
    /// Match every trip and summarize the distance errors
    Evaluate {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Serve trip views as JSON for a web map
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

/// Reads a password without echoing it.
fn read_password(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    enable_raw_mode()?;
    let mut password = String::new();
    let result = loop {
        match event::read() {
            Ok(Event::Key(KeyEvent {
                code, modifiers, kind: KeyEventKind::Press, ..
            })) => match code {
                KeyCode::Enter => break Ok(Some(password)),
                KeyCode::Esc => break Ok(None),
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => break Ok(None),
                KeyCode::Backspace => {
                    password.pop();
                }
                KeyCode::Char(c) => password.push(c),
                _ => {}
            },
            Ok(_) => {}
            Err(e) => break Err(e.into()),
        }
    };
    disable_raw_mode()?;
    println!();
    result
}

fn print_view(view: &TripView) {
    println!("================================================");
    println!("Cycle ID: {}", view.cycle_id);
    if let Some(start) = &view.start {
        println!("Starting Datetime: {start}");
    }
    println!("Points: {}", view.markers.len());
    if let Some(gaps) = view.gap_policy {
        println!("Gap policy: {gaps}");
    }
    if let Some(matched_km) = view.matched_km {
        println!(
            "Predicted Distance: {:.2} km ({} requests)",
            matched_km, view.requests_issued
        );
    }
    if let Some(direct_km) = view.direct_km {
        println!("Direct Distance: {direct_km:.2} km");
    }
    match view.odometer_km {
        Some(odometer_km) => println!("Odometer Distance: {odometer_km:.2} km"),
        None => println!("Odometer Distance: unknown"),
    }
    for message in &view.messages {
        println!("{message}");
    }
}

fn export_view(view: &TripView) -> Result<PathBuf> {
    let path = PathBuf::from(format!("trip_{}.gpx", view.cycle_id));
    let mut file = File::create(&path)?;
    export_data::trip_view_to_gpx_file(view, &mut file)?;
    Ok(path)
}

fn browse(session: &mut ExplorerSession, service: &OsrmClient) -> Result<()> {
    if session.dataset().trips().is_empty() {
        bail!("no trips loaded");
    }
    loop {
        let Some(view) = session.view_current_cycle(service) else {
            return Ok(());
        };
        print_view(&view);
        println!(
            "[{}/{}] n: next cycle, p: previous, e: export GPX, q: quit",
            session.cycle_index() + 1,
            session.dataset().trips().len()
        );

        enable_raw_mode()?;
        let key = loop {
            if let Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            {
                break code;
            }
        };
        disable_raw_mode()?;

        match key {
            KeyCode::Char('n') | KeyCode::Right => session.next_cycle(),
            KeyCode::Char('p') | KeyCode::Left => session.previous_cycle(),
            KeyCode::Char('e') => match export_view(&view) {
                Ok(path) => println!("exported to {}", path.display()),
                Err(e) => println!("export failed: {e:#}"),
            },
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            _ => {}
        }
    }
}

fn vehicle(
    session: &mut ExplorerSession,
    service: &OsrmClient,
    model: Option<String>,
    trip: usize,
) -> Result<()> {
    let Some(model) = model else {
        for model in session.vehicle_models() {
            println!("{model}");
        }
        return Ok(());
    };
    session.select_vehicle(&model)?;
    println!("Trip Sequence for {model}");
    for row in session.trip_table(&model) {
        println!(
            "{:>3}  {:<24} {:<20} {:<20}",
            row.trip_number,
            row.cycle_id,
            row.start.as_deref().unwrap_or("-"),
            row.end.as_deref().unwrap_or("-")
        );
    }
    session.select_trip(trip.saturating_sub(1))?;
    if let Some(view) = session.view_selected_trip(service) {
        println!(
            "Route for Trip {trip} of {}",
            session.selected_vehicle().unwrap_or(&model)
        );
        print_view(&view);
    }
    Ok(())
}

fn evaluate(session: &ExplorerSession, service: &OsrmClient, limit: Option<usize>) -> Result<()> {
    let cycle_ids: Vec<String> = session
        .dataset()
        .cycle_ids()
        .take(limit.unwrap_or(usize::MAX))
        .map(str::to_string)
        .collect();
    let mut reconciliations = Vec::new();
    for (i, cycle_id) in cycle_ids.iter().enumerate() {
        let view = session.view_trip(cycle_id, service);
        match view.reconciliation {
            Some(r) => reconciliations.push(r),
            None => println!("{cycle_id}: {}", view.messages.join(" ")),
        }
        if (i + 1) % 50 == 0 {
            println!("{}/{} trips matched", i + 1, cycle_ids.len());
        }
    }

    let Some(summary) = EvaluationSummary::from_reconciliations(&reconciliations) else {
        bail!("no trip with a usable odometer delta");
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let absolute: Vec<f64> = reconciliations
        .iter()
        .filter(|r| r.has_ground_truth())
        .map(|r| r.absolute_difference_km())
        .collect();
    let relative: Vec<f64> = reconciliations
        .iter()
        .filter_map(|r| r.relative_difference())
        .collect();
    println!("absolute difference (0-5 km): {:?}", histogram(&absolute, 50, 0., 5.));
    println!("relative difference (0-0.2): {:?}", histogram(&relative, 50, 0., 0.2));
    Ok(())
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.backend = StorageBackend::Local { root: data_dir };
    }
    match &config.log_dir {
        Some(log_dir) => logs::init(log_dir)?,
        None => logs::init_stderr(),
    }

    let gate = AccessGate::new(config.app_password.clone());
    if !gate.is_open() {
        match read_password("Enter Password: ")? {
            Some(input) if gate.check(&input) => {}
            _ => bail!("wrong password"),
        }
    }

    let store = storage::open_store(&config.storage)?;
    let dataset = Arc::new(storage::load_dataset(store.as_ref(), &config.storage)?);
    let service = OsrmClient::new(&config.service)?;
    let mut session = ExplorerSession::new(dataset.clone(), config.policy.clone());

    match cli.command.unwrap_or(Command::Browse) {
        Command::Browse => browse(&mut session, &service),
        Command::Vehicle { model, trip } => vehicle(&mut session, &service, model, trip),
        Command::Evaluate { limit } => evaluate(&session, &service, limit),
        Command::Serve { host, port } => {
            let mut server = MapServer::new(
                &host,
                port,
                dataset,
                Arc::new(service),
                config.policy.clone(),
            );
            server.start()?;
            println!("serving trip views at {}/cycles", server.url());
            println!("Press Enter to stop");
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            server.stop();
            Ok(())
        }
    }
}
