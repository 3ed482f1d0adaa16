//! Polarity Dash headless runner
//!
//! Drives the simulation at 60 Hz on autopilot and reports the result.
//!
//! Usage: `polarity-dash [seed] [seconds] [settings.json]`

use std::process::ExitCode;

use polarity_dash::consts::FRAME_MS;
use polarity_dash::sim::{GamePhase, GameState, LogSink, RestoreDecision, TickInput, tick};
use polarity_dash::{Error, Settings};

struct Args {
    seed: u64,
    seconds: f64,
    settings: Settings,
}

fn parse_args() -> Result<Args, Error> {
    let mut args = std::env::args().skip(1);
    let seed = match args.next() {
        Some(s) => s
            .parse()
            .map_err(|_| Error::InvalidSettings(format!("seed must be an integer, got '{}'", s)))?,
        None => 12345,
    };
    let seconds = match args.next() {
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| Error::InvalidSettings(format!("seconds must be positive, got '{}'", s)))?,
        None => 60.0,
    };
    let settings = match args.next() {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };
    Ok(Args {
        seed,
        seconds,
        settings,
    })
}

fn main() -> ExitCode {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: polarity-dash [seed] [seconds] [settings.json]");
            return ExitCode::FAILURE;
        }
    };

    log::info!("Polarity Dash (headless) starting, seed {}", args.seed);
    let mut state = GameState::new(args.seed, args.settings);
    let mut sink = LogSink;
    let frames = (args.seconds * 1000.0 / FRAME_MS).ceil() as u64;

    let mut now = 0.0;
    for _ in 0..frames {
        now += FRAME_MS;
        let input = TickInput {
            now,
            delta_time: FRAME_MS,
            autopilot: true,
            restore: matches!(state.phase, GamePhase::RestoreOffered { .. }).then_some(RestoreDecision::Accept),
            ..Default::default()
        };
        tick(&mut state, &input);
        state.dispatch(&mut sink);

        if state.phase == GamePhase::GameOver {
            break;
        }
    }

    println!(
        "seed {}  score {}  time {:.1}s  {}",
        args.seed,
        state.score,
        state.clock / 1000.0,
        if state.phase == GamePhase::GameOver { "game over" } else { "survived" }
    );
    ExitCode::SUCCESS
}
