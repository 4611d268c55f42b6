//! Performance benchmarks for treeidx
//!
//! Run with: `cargo bench`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use treeidx::index::build_index;
use treeidx::index::types::IndexConfig;
use treeidx::utils::Tokenizer;

/// Write `count` JavaScript modules of similar shape under `root`
fn write_fixtures(root: &Path, count: usize) {
    for i in 0..count {
        let content = format!(
            r#"// Module {i}
import {{ parseRequest_{i} }} from './parser_{i}';

export function handleRequest{i}(request) {{
    const headers = parseRequest_{i}(request.headers);
    /* retry up to {i} times */
    return `status: ${{headers.status_code}}`;
}}

export class RequestHandler{i} {{
    constructor() {{ this.maxRetries = {i}; }}
}}
"#,
            i = i
        );
        let dir = root.join(format!("pkg_{}", i % 10));
        fs::create_dir_all(&dir).expect("Failed to create fixture dir");
        fs::write(dir.join(format!("handler_{}.js", i)), content).expect("Failed to write file");
    }
}

fn bench_tokenize(c: &mut Criterion) {
    let source = fs::read_to_string(file!()).unwrap_or_default();

    let mut group = c.benchmark_group("tokenize");
    for name in Tokenizer::registered_names() {
        let tokenizer = Tokenizer::by_name(name).expect("registered");
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, text| {
            b.iter(|| tokenizer.normalize(black_box(text.as_str())))
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_fixtures(temp_dir.path(), 500);
    let config = IndexConfig::default();

    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    group.bench_function("500_files", |b| {
        b.iter(|| build_index(temp_dir.path(), &config, Tokenizer::SOURCE_CODE, true))
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_fixtures(temp_dir.path(), 500);
    let (index, _) = build_index(
        temp_dir.path(),
        &IndexConfig::default(),
        Tokenizer::SOURCE_CODE,
        true,
    )
    .expect("Failed to build index");

    let queries = ["request", "handler headers", "status_code retry", "missing"];

    let mut group = c.benchmark_group("search");
    for query in queries {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &q| {
            b.iter(|| index.search(black_box(q)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_build, bench_search);
criterion_main!(benches);
