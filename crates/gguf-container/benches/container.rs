use criterion::{Criterion, criterion_group, criterion_main};
use gguf_container::{ContainerReader, ContainerWriter, TensorType, Value, new_writer};
use std::hint::black_box;

fn build(vocab: usize, tensors: usize) -> ContainerWriter<'static> {
    let mut w = new_writer("bench.gguf", "bench");
    let tokens: Vec<String> = (0..vocab).map(|i| format!("tok{i}")).collect();
    w.add_key_value("tokenizer.ggml.tokens", Value::string_array(tokens)).unwrap();
    w.add_key_value("bench.context_length", 4096u32).unwrap();
    for i in 0..tensors {
        w.add_tensor(format!("blk.{i}.weight"), vec![0u8; 64 * 64 * 4], vec![64, 64], TensorType::F32)
            .unwrap();
    }
    w
}

fn benchmark_container(c: &mut Criterion) {
    let writer = build(32_000, 64);
    let bytes = writer.to_bytes().unwrap();

    c.bench_function("serialize_32k_vocab_64_tensors", |b| {
        b.iter(|| black_box(writer.to_bytes().unwrap()))
    });

    c.bench_function("parse_32k_vocab_64_tensors", |b| {
        b.iter(|| black_box(ContainerReader::from_bytes(black_box(bytes.clone())).unwrap()))
    });

    let reader = ContainerReader::from_bytes(bytes.clone()).unwrap();
    c.bench_function("read_all_tensor_bytes", |b| {
        b.iter(|| {
            let total: usize = reader.tensors().iter().map(|t| reader.read_tensor_bytes(t).unwrap().len()).sum();
            black_box(total)
        })
    });
}

criterion_group!(benches, benchmark_container);
criterion_main!(benches);
