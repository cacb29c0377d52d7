use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;
use wsnet2::codec::{marshal_to_vec, unmarshal, Value};

fn sample_room_props() -> Value {
    let mut dict = BTreeMap::new();
    dict.insert("map".to_string(), Value::Str("ascent".to_string()));
    dict.insert("mode".to_string(), Value::Str("ranked".to_string()));
    dict.insert("rating".to_string(), Value::Int(1850));
    dict.insert(
        "scores".to_string(),
        Value::Ints(vec![10, 12, 7, 9, 15, 3, 8, 11]),
    );
    Value::Dict(dict)
}

fn bench_marshal(c: &mut Criterion) {
    let value = sample_room_props();
    c.bench_function("marshal_room_props", |b| {
        b.iter(|| black_box(marshal_to_vec(&value)));
    });
}

fn bench_unmarshal(c: &mut Criterion) {
    let bytes = marshal_to_vec(&sample_room_props());
    c.bench_function("unmarshal_room_props", |b| {
        b.iter(|| black_box(unmarshal(&bytes).unwrap()));
    });
}

criterion_group!(codec_roundtrip, bench_marshal, bench_unmarshal);
criterion_main!(codec_roundtrip);
