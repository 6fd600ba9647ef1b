use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use donkey_control::{
    actuator::{
        board::{ChannelWrite, SimulatedBoard},
        bus::SharedBus,
        controller::PulseController,
        throttle::PwmThrottle,
        vehicle::Vehicle,
    },
    command::{
        dispatcher::CommandDispatcher,
        message::DriveCommand,
        subscriber::{CommandSubscriber, DeliveryPolicy},
    },
    config::NodeConfig,
    utils::journal::WriteJournal,
};

fn fast_config() -> NodeConfig {
    NodeConfig {
        init_delay: Duration::ZERO,
        calibration_delay: Duration::ZERO,
        ..NodeConfig::default()
    }
}

fn w(channel: u8, off: u16) -> ChannelWrite {
    ChannelWrite { channel, on: 0, off }
}

#[test]
fn replayed_commands_reach_the_board_in_order() {
    let board = SimulatedBoard::new();
    let journal = Arc::new(WriteJournal::new());
    let bus = SharedBus::new(board.clone()).with_journal(journal.clone());
    let vehicle = Vehicle::new(bus.clone(), &fast_config()).unwrap();
    board.clear();
    journal.drain();

    let running = Arc::new(AtomicBool::new(true));
    let (mut subscriber, rx) = CommandSubscriber::channel(DeliveryPolicy::Blocking);
    let intake_running = running.clone();
    let intake = thread::spawn(move || {
        subscriber
            .run("0,5\n0,-5\n".as_bytes(), &intake_running)
            .unwrap()
    });

    let mut dispatcher =
        CommandDispatcher::new(rx, vehicle, running.clone()).with_poll(Duration::from_millis(5));
    dispatcher.run().unwrap();
    assert_eq!(intake.join().unwrap(), 2);

    let mut vehicle = dispatcher.into_vehicle();
    assert_eq!(vehicle.commands_handled(), 2);

    let expected = vec![
        // speed 0, steering 5
        w(5, 0),
        w(4, 0),
        w(3, 4095),
        w(0, 5),
        w(2, 0),
        w(1, 4095),
        // speed 0, steering -5
        w(5, 0),
        w(4, 0),
        w(3, 4095),
        w(0, 5),
        w(1, 0),
        w(2, 4095),
    ];
    assert_eq!(board.writes(), expected);

    let journaled: Vec<ChannelWrite> = journal
        .drain()
        .into_iter()
        .map(|e| ChannelWrite {
            channel: e.channel,
            on: e.on,
            off: e.off,
        })
        .collect();
    assert_eq!(journaled, expected);

    board.clear();
    vehicle.shutdown().unwrap();
    assert_eq!(board.last_off(5), Some(0));
    assert_eq!(board.last_off(0), Some(0));
    assert_eq!(bus.last_output(2), Some((0, 4095)));
}

#[test]
fn throttle_ramp_from_rest() {
    let board = SimulatedBoard::new();
    let bus = SharedBus::new(board.clone());
    let controller = PulseController::new(bus, 5, 0x40, 60.0, Duration::ZERO).unwrap();
    assert_eq!(controller.scale(), 1.0);

    let mut throttle = PwmThrottle::new(controller, Duration::ZERO).unwrap();
    assert_eq!(throttle.ramp_to(0.0).unwrap(), 0.0);
    assert_eq!(throttle.ramp_to(100.0).unwrap(), 170.0);
    assert_eq!(throttle.output().controller().prev_pulse(), 170.0);
    assert_eq!(board.last_off(5), Some(170));
}

#[test]
fn shutdown_always_zeroes_outputs() {
    let board = SimulatedBoard::new();
    let mut vehicle = Vehicle::new(SharedBus::new(board.clone()), &fast_config()).unwrap();

    for cmd in [
        DriveCommand::new(4095.0, 4095.0),
        DriveCommand::new(-2000.0, -1.0),
        DriveCommand::stop(),
    ] {
        vehicle.handle(&cmd).unwrap();
        board.clear();
        vehicle.shutdown().unwrap();
        assert_eq!(board.writes()[0], w(5, 0));
        assert_eq!(board.writes()[3], w(0, 0));
    }
}

#[test]
fn live_intake_stops_with_running_flag() {
    let board = SimulatedBoard::new();
    let vehicle = Vehicle::new(SharedBus::new(board.clone()), &fast_config()).unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let (_subscriber, rx) = CommandSubscriber::channel(DeliveryPolicy::LatestWins);

    let flag = running.clone();
    let handle = thread::spawn(move || {
        let mut dispatcher =
            CommandDispatcher::new(rx, vehicle, flag).with_poll(Duration::from_millis(5));
        let outcome = dispatcher.run();
        (dispatcher.into_vehicle(), outcome)
    });

    thread::sleep(Duration::from_millis(20));
    running.store(false, Ordering::Release);
    let (vehicle, outcome) = handle.join().unwrap();
    assert!(outcome.is_ok());
    assert_eq!(vehicle.commands_handled(), 0);
}
