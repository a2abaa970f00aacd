use classifier::{Classifier, ClassifierConfig, MockRuntime};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_classify(c: &mut Criterion) {
    let runtime = MockRuntime::image(224, 224, 3, 1000);
    let mut classifier = Classifier::new(runtime, ClassifierConfig::default()).unwrap();
    let pixels = vec![0u8; classifier.input_capacity()];

    c.bench_function("classify_224x224x3", |b| {
        b.iter(|| classifier.classify(black_box(&pixels)).unwrap())
    });
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
