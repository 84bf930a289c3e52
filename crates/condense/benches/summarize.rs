use condense_extract::{ExtractiveSummarizer, SegmentationService};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_summarize_200_sentences(c: &mut Criterion) {
    let text = (0..200)
        .map(|i| {
            format!(
                "Sample {i} saw queue depth {} on worker{} while the scheduler retried batch {}.",
                i * 7 % 50,
                i % 16,
                i / 3
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    let segmentation = SegmentationService::new();
    let summarizer = ExtractiveSummarizer::default();

    c.bench_function("summarize_200_sentences", |b| {
        b.iter(|| summarizer.summarize_text(&segmentation, black_box(&text), 0.3));
    });
}

criterion_group!(benches, bench_summarize_200_sentences);
criterion_main!(benches);
