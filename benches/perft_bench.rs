use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferrum_chess::board::position::Position;
use ferrum_chess::movegen::{generate, perft, GenType, MoveList};

fn perft_bench(c: &mut Criterion) {
    ferrum_chess::init();

    c.bench_function("perft 3 startpos", |b| {
        let mut pos = Position::startpos();
        b.iter(|| black_box(perft(&mut pos, 3)));
    });

    c.bench_function("perft 3 kiwipete", |b| {
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        b.iter(|| black_box(perft(&mut pos, 3)));
    });
}

fn movegen_bench(c: &mut Criterion) {
    ferrum_chess::init();
    let pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();

    c.bench_function("generate kiwipete", |b| {
        b.iter(|| {
            let mut list = MoveList::new();
            generate(black_box(&pos), GenType::Captures, &mut list);
            generate(black_box(&pos), GenType::Quiets, &mut list);
            black_box(list.len())
        });
    });
}

criterion_group!(benches, perft_bench, movegen_bench);
criterion_main!(benches);
