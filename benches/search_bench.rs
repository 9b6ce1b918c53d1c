use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferrum_chess::board::position::{Move, Position, STARTPOS_FEN};
use ferrum_chess::engine::{Info, SearchRequest};
use ferrum_chess::eval::evaluate::evaluate;
use ferrum_chess::search::search;

fn eval_bench(c: &mut Criterion) {
    ferrum_chess::init();
    let pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();

    c.bench_function("evaluate kiwipete", |b| {
        b.iter(|| black_box(evaluate(black_box(&pos))));
    });
}

fn search_bench(c: &mut Criterion) {
    ferrum_chess::init();

    c.bench_function("search depth 5 startpos", |b| {
        b.iter(|| {
            let mut request = SearchRequest::new(
                STARTPOS_FEN,
                Box::new(|_: &Info| {}),
                Box::new(|m: Move| {
                    black_box(m);
                }),
            );
            request.depth = Some(5);
            request.stop = Arc::new(AtomicBool::new(false));
            search(request).unwrap();
        });
    });
}

criterion_group!(benches, eval_bench, search_bench);
criterion_main!(benches);
