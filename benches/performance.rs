/// 合成コーパス上のベクトル化と学習の性能ベンチマーク。
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use doc_classifier::{
    analysis::{CorpusShape, synthetic_dataset},
    classification::{
        Classifier, ModelSpec, PipelineConfig, Splitter, TextPipeline, TfidfVectorizer,
        VectorizerConfig,
    },
};

fn bench_vectorization(c: &mut Criterion) {
    let dataset = synthetic_dataset(
        CorpusShape {
            documents: 1000,
            ..CorpusShape::default()
        },
        42,
    );
    let contents = dataset.contents();

    c.bench_function("tfidf_fit_transform_1k_docs", |b| {
        b.iter(|| {
            let mut vectorizer = TfidfVectorizer::new(VectorizerConfig::exploratory(), Splitter::default());
            let features = vectorizer.fit_transform(&contents).expect("vectorize");
            black_box(features.dim());
        });
    });
}

fn bench_model_fitting(c: &mut Criterion) {
    let dataset = synthetic_dataset(CorpusShape::default(), 42);
    let contents = dataset.contents();
    let (_, labels) = dataset.encoded_labels();
    let mut vectorizer = TfidfVectorizer::new(VectorizerConfig::exploratory(), Splitter::default());
    let features = vectorizer.fit_transform(&contents).expect("vectorize");

    let mut group = c.benchmark_group("fit_400_docs");
    group.sample_size(10);
    for spec in ModelSpec::comparison_suite() {
        group.bench_function(spec.name(), |b| {
            b.iter(|| {
                let mut model = spec.build(0);
                model.fit(features.view(), &labels).expect("fit");
                black_box(model.classes().map(<[usize]>::len).unwrap_or_default());
            });
        });
    }
    group.finish();
}

fn bench_export_pipeline(c: &mut Criterion) {
    let dataset = synthetic_dataset(CorpusShape::default(), 42);
    let contents = dataset.contents();
    let (categories, labels) = dataset.encoded_labels();
    let config = PipelineConfig::export(200);

    let mut group = c.benchmark_group("export_pipeline");
    group.sample_size(10);
    group.bench_function("fit_newton_cg_balanced", |b| {
        b.iter(|| {
            let pipeline = TextPipeline::fit(&config, &contents, &labels, categories.clone()).expect("fit");
            black_box(pipeline.selected_terms().map(|terms| terms.len()).unwrap_or_default());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_vectorization, bench_model_fitting, bench_export_pipeline);
criterion_main!(benches);
