//! # donkey_control node
//! Reads drive commands (`speed,steering_angle` per line) and turns them into
//! PCA9685 pulses for the steering servo and the throttle ESC.
//!
//! ## Threads
//! - **Intake:** parses stdin (or `--input` file) into commands → bounded(1) channel.
//! - **Dispatcher:** applies each command to the vehicle, throttle before steering.
//! - **Signal watch:** Ctrl-C clears the shared `running` flag.
//! - **Main:** idles at 10 Hz until `running` is cleared, then stops the car.
//!
//! ## Shutdown
//! Ctrl-C, end of input, or a fatal write fault all end in the same place:
//! the dispatcher hands the vehicle back and both outputs get a zero pulse.

use std::{
    fs::File,
    io::Read,
    process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use structopt::StructOpt;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use donkey_control::{
    actuator::{bus::SharedBus, vehicle::Vehicle},
    command::{
        dispatcher::CommandDispatcher,
        subscriber::{CommandSubscriber, DeliveryPolicy},
    },
    config::{NodeConfig, Opts},
    error::{DriveError, DriveResult},
    utils::journal::WriteJournal,
};

fn main() {
    env_logger::init();
    let opts = Opts::from_args();

    if let Err(e) = run(opts) {
        error!("[Main] {}", e);
        process::exit(1);
    }
}

fn run(opts: Opts) -> DriveResult<()> {
    let config = opts.into_config()?;
    info!("=== DONKEY CONTROL START ({}) ===", config.name);

    let journal = match &config.journal {
        Some(path) => {
            let journal = Arc::new(WriteJournal::new());
            journal.start_exporter(path.clone())?;
            Some(journal)
        }
        None => None,
    };

    let mut bus = open_bus(&config)?;
    if let Some(j) = &journal {
        bus = bus.with_journal(j.clone());
    }

    // Board init → settle → zero pulse → ESC arming, steering then throttle.
    let vehicle = Vehicle::new(bus.clone(), &config)?;

    let running = Arc::new(AtomicBool::new(true));
    spawn_signal_watcher(running.clone())?;

    let policy = if config.input.is_some() {
        DeliveryPolicy::Blocking
    } else {
        DeliveryPolicy::LatestWins
    };
    let (subscriber, queue) = CommandSubscriber::channel(policy);
    let _intake = spawn_intake(subscriber, &config, running.clone())?;
    info!("Teleop subscriber ready, waiting for commands...");

    let dispatcher = CommandDispatcher::new(queue, vehicle, running.clone());
    let dispatcher_handle = spawn_dispatcher(dispatcher)?;

    idle(&config, &bus, &running);

    info!("[Main] shutting down");
    let outcome = match dispatcher_handle.join() {
        Ok((mut vehicle, outcome)) => {
            if let Err(e) = vehicle.shutdown() {
                error!("[Main] failed to stop vehicle: {}", e);
            }
            outcome
        }
        Err(_) => {
            error!("[Main] dispatcher panicked, zeroing primaries directly");
            emergency_stop(&bus, &config);
            Err(DriveError::Config("dispatcher thread panicked".into()))
        }
    };

    if let Some(j) = journal {
        j.stop_exporter();
    }

    outcome?;
    info!("=== DONKEY CONTROL FINISHED ===");
    Ok(())
}

#[cfg(feature = "pca9685")]
fn open_bus(config: &NodeConfig) -> DriveResult<SharedBus> {
    use donkey_control::actuator::{board::SimulatedBoard, pca9685::Pca9685Board};

    if config.dry_run {
        info!("[Main] dry run: using simulated board");
        return Ok(SharedBus::new(SimulatedBoard::new()));
    }
    let board = Pca9685Board::open(config.i2c_bus, config.address)?;
    Ok(SharedBus::new(board))
}

#[cfg(not(feature = "pca9685"))]
fn open_bus(config: &NodeConfig) -> DriveResult<SharedBus> {
    use donkey_control::actuator::board::SimulatedBoard;

    if !config.dry_run {
        return Err(DriveError::Init(
            "built without the `pca9685` feature; rebuild with it or pass --dry-run".into(),
        ));
    }
    info!("[Main] dry run: using simulated board");
    Ok(SharedBus::new(SimulatedBoard::new()))
}

/// Main loop: hold at `rate_hz` until something clears `running`.
fn idle(config: &NodeConfig, bus: &SharedBus, running: &AtomicBool) {
    let period = config.rate_period();
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    while running.load(Ordering::Acquire) {
        sleeper.sleep(period);
        if config.hold_refresh {
            match bus.reapply_outputs() {
                Ok(n) => debug!("[Main] refreshed {} channels", n),
                Err(e) => {
                    error!("[Main] refresh failed: {}", e);
                    running.store(false, Ordering::Release);
                }
            }
        }
    }
}

/// Ctrl-C handling on a small current-thread tokio runtime.
fn spawn_signal_watcher(running: Arc<AtomicBool>) -> DriveResult<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signal_watch".into())
        .spawn(move || match rt.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("[Main] Ctrl-C received");
                running.store(false, Ordering::Release);
            }
            Err(e) => warn!("[Main] cannot listen for Ctrl-C: {}", e),
        })?;
    Ok(())
}

/// Intake thread. Blocks on its reader, so it is not joined at shutdown.
fn spawn_intake(
    mut subscriber: CommandSubscriber,
    config: &NodeConfig,
    running: Arc<AtomicBool>,
) -> DriveResult<JoinHandle<()>> {
    let reader: Box<dyn Read + Send> = match &config.input {
        Some(path) => {
            info!("[Main] replaying commands from {:?}", path);
            Box::new(File::open(path)?)
        }
        None => Box::new(std::io::stdin()),
    };

    let handle = thread::Builder::new()
        .name("command_intake".into())
        .spawn(move || {
            match subscriber.run(reader, &running) {
                Ok(n) => info!(
                    "[Intake] input ended: {} commands, {} skipped, {} superseded",
                    n,
                    subscriber.skipped(),
                    subscriber.dropped()
                ),
                Err(e) => error!("[Intake] {}", e),
            }
        })?;
    Ok(handle)
}

/// Dispatcher thread at max priority when the OS allows it.
fn spawn_dispatcher(
    mut dispatcher: CommandDispatcher,
) -> DriveResult<JoinHandle<(Vehicle, DriveResult<()>)>> {
    let handle = thread::Builder::new()
        .name("dispatcher".into())
        .spawn_with_priority(ThreadPriority::Max, move |priority| {
            if let Err(e) = priority {
                debug!("[Dispatcher] running at default priority: {:?}", e);
            }
            let outcome = dispatcher.run();
            (dispatcher.into_vehicle(), outcome)
        })?;
    Ok(handle)
}

fn emergency_stop(bus: &SharedBus, config: &NodeConfig) {
    for channel in [config.throttle_channel, config.steering_channel] {
        if let Err(e) = bus.set_pwm(channel, 0, 0) {
            error!("[Main] emergency stop on ch{} failed: {}", channel, e);
        }
    }
}
