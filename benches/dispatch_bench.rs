use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, time::Duration};

use donkey_control::{
    actuator::{board::SimulatedBoard, bus::SharedBus, vehicle::Vehicle},
    command::message::DriveCommand,
    config::NodeConfig,
    utils::journal::WriteJournal,
};

fn config() -> NodeConfig {
    NodeConfig {
        init_delay: Duration::ZERO,
        calibration_delay: Duration::ZERO,
        ..NodeConfig::default()
    }
}

fn vehicle_dispatch_bench(c: &mut Criterion) {
    let board = SimulatedBoard::new();
    let mut vehicle = Vehicle::new(SharedBus::new(board.clone()), &config())
        .expect("vehicle on simulated board");
    let cmd = DriveCommand::new(350.0, -120.0);

    c.bench_function("vehicle_handle", |b| {
        b.iter(|| {
            vehicle.handle(black_box(&cmd)).expect("simulated write");
            board.clear();
        })
    });
}

fn journaled_dispatch_bench(c: &mut Criterion) {
    let board = SimulatedBoard::new();
    let journal = std::sync::Arc::new(WriteJournal::new());
    let bus = SharedBus::new(board.clone()).with_journal(journal.clone());
    let mut vehicle = Vehicle::new(bus, &config()).expect("vehicle on simulated board");
    let cmd = DriveCommand::new(350.0, -120.0);

    c.bench_function("vehicle_handle_journaled", |b| {
        b.iter(|| {
            vehicle.handle(black_box(&cmd)).expect("simulated write");
            board.clear();
            journal.drain();
        })
    });
}

criterion_group!(benches, vehicle_dispatch_bench, journaled_dispatch_bench);
criterion_main!(benches);
