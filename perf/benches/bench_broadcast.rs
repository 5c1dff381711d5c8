use basalt_buffers::AlignedBuffer;
use basalt_icc::descriptor::BROADCAST_TRAILER_LENGTH;
use basalt_icc::{BroadcastReceiver, BroadcastTransmitter};
use basalt_perf::{file_backed_region, temp_shm_path};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_round_trip(c: &mut Criterion) {
    let path = temp_shm_path("crit_bcast");
    let (_mm, buffer) = file_backed_region(&path, 65536 + BROADCAST_TRAILER_LENGTH);
    let mut tx = BroadcastTransmitter::wrap(buffer).expect("failed to wrap transmitter");
    let mut rx = BroadcastReceiver::wrap(buffer).expect("failed to wrap receiver");

    let mut src = AlignedBuffer::with_capacity(64);
    src.buffer().set_memory(0, 64, 0xCD).unwrap();
    let src_buffer = src.buffer();

    let mut group = c.benchmark_group("broadcast");
    group.throughput(Throughput::Elements(1));

    group.bench_function("round_trip_64b", |b| {
        b.iter(|| {
            tx.transmit(1, black_box(&src_buffer), 0, 64).unwrap();
            assert!(rx.receive_next().unwrap());
        });
    });

    group.bench_function("receive_next (empty)", |b| {
        b.iter(|| black_box(rx.receive_next().unwrap()));
    });

    drop(group);
    let _ = std::fs::remove_file(&path);
}

criterion_group!(benches, bench_round_trip);
criterion_main!(benches);
