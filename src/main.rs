use std::{error::Error, process, sync::Arc};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
};

use tandem::{
    client::{Client, Handle, Status},
    command::PlayContext,
    config::Config,
    device::Detached,
    events::Event,
    remote::WebApi,
    signal,
    state::DeviceId,
    token::{AccessToken, StaticToken},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// See `tandem.toml.example` for the available settings.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<String>,

    /// Web API access token
    ///
    /// Keep this out of your shell history: prefer the environment variable.
    #[arg(long, env = "TANDEM_TOKEN", hide_env_values = true)]
    token: String,

    /// Device name
    ///
    /// [default: system hostname]
    #[arg(short, long, value_hint = ValueHint::Hostname)]
    name: Option<String>,

    /// Never pull playback onto this device
    #[arg(long, default_value_t = false)]
    no_auto_transfer: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

fn load_config(args: &Args) -> tandem::error::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(name) = args.name.clone().or_else(sysinfo::System::host_name) {
        config.device_name = name;
    }
    if args.no_auto_transfer {
        config.auto_transfer = false;
    }

    Ok(config)
}

/// Logs what changed between two published statuses.
fn log_status(previous: &Status, current: &Status) {
    if current.track != previous.track {
        match &current.track {
            Some(track) => info!("now playing: {track}"),
            None if current.is_loaded() && current.snapshot().is_none() => {
                info!("nothing playing");
            }
            None => {}
        }
    }

    if current.playback_error != previous.playback_error {
        if let Some(e) = &current.playback_error {
            warn!("remote status unavailable: {e}");
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Play => info!("playing"),
        Event::Pause => info!("paused"),
        Event::Connected(device_id) => info!("local device connected as {device_id}"),
        Event::Disconnected => info!("local device disconnected"),
        Event::SourceChanged(source) => debug!("following {source}"),
        Event::TransferStarted(device_id) => debug!("transfer to {device_id} started"),
        Event::TransferFinished { device_id, success } => {
            debug!("transfer to {device_id} finished (success: {success})");
        }
        Event::TrackChanged => {}
    }
}

fn print_devices(status: &Status) {
    if status.devices.is_empty() {
        println!("no devices");
    }

    for device in &status.devices {
        let marker = if device.is_active { "*" } else { " " };
        let id = device.id.as_ref().map_or("-", DeviceId::as_str);
        println!("{marker} {id} {} ({})", device.name, device.kind);
    }
}

fn print_status(status: &Status) {
    let track = status
        .track
        .as_ref()
        .map_or_else(|| "nothing".to_string(), ToString::to_string);
    let state = if status.is_playing { "playing" } else { "paused" };

    println!(
        "{state}: {track} [{:.0}s/{:.0}s, {:.0}%] via {}",
        status.progress.as_secs_f64(),
        status.duration.as_secs_f64(),
        status.percent,
        status.source,
    );
}

/// Executes one line of standard input.
async fn execute(handle: &Handle, line: &str) -> tandem::error::Result<()> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(());
    };
    let args: Vec<&str> = words.collect();

    match command {
        "play" => match args.as_slice() {
            [] => handle.resume().await,
            [uri] if uri.contains(":track:") || uri.contains(":episode:") => {
                handle.play_context(PlayContext::tracks([*uri])).await
            }
            [uri] => handle.play_context(PlayContext::context(*uri)).await,
            uris => handle.play_context(PlayContext::tracks(uris.iter().copied())).await,
        },
        "pause" => handle.pause().await,
        "resume" => handle.resume().await,
        "toggle" => handle.toggle_play().await,
        "next" => handle.next_track().await,
        "previous" => handle.previous_track().await,
        "volume" => match args.first().and_then(|percent| percent.parse().ok()) {
            Some(percent) => handle.set_volume(percent).await,
            None => Err(tandem::error::Error::invalid_argument("usage: volume <0-100>")),
        },
        "shuffle" => handle.toggle_shuffle().await,
        "transfer" => match args.first() {
            Some(id) => handle.transfer(DeviceId::from(*id)).await,
            None => Err(tandem::error::Error::invalid_argument("usage: transfer <device id>")),
        },
        "devices" => {
            print_devices(&handle.status());
            handle.refresh_devices().await
        }
        "refresh" => handle.refresh().await,
        "status" => {
            print_status(&handle.status());
            Ok(())
        }
        other => Err(tandem::error::Error::invalid_argument(format!(
            "unknown command: {other}"
        ))),
    }
}

/// Main application loop.
///
/// Runs the playback core against the Web API without a local device, and
/// reads control commands from standard input until a shutdown signal
/// arrives or input ends.
///
/// # Errors
///
/// Returns an error when the configuration or token are invalid, or the
/// HTTP client cannot be created.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    debug!("{config:#?}");

    let token = AccessToken::new(args.token)?;
    let remote = WebApi::new(&config, Arc::new(StaticToken::new(token)))?;

    // Without a local device nothing is ever sent, but keep the channel open.
    let (_device_tx, device_rx) = mpsc::channel(1);
    let (client, handle) = Client::new(&config, Arc::new(remote), Box::new(Detached), device_rx);
    let mut core = tokio::spawn(client.run());

    let mut status = handle.subscribe();
    let mut previous = status.borrow().clone();
    let mut events = handle.events();

    let mut signals = signal::Handler::new()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            signal = signals.recv() => {
                info!("received {signal}, shutting down gracefully");
                break;
            }

            result = &mut core => {
                if let Err(e) = result {
                    error!("playback core failed: {e}");
                }
                return Ok(());
            }

            event = events.recv() => {
                match event {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                }
            }

            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                log_status(&previous, &current);
                previous = current;
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if let Err(e) = execute(&handle, &line).await {
                            error!("{e}");
                        }
                    }
                    Ok(None) => {
                        debug!("standard input closed");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("failed to read standard input: {e}");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
