/// Benchmarks for document cache lookups and summary updates
use context_sync::document_cache::DocumentInfoCache;
use context_sync::types::{CodeObjectId, CodeObjectSummary, DocumentInfo, FileUri, MethodInfo};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

const METHODS_PER_FILE: usize = 40;

fn file_uri(index: usize) -> FileUri {
    FileUri::new(format!("file:///src/module_{}.py", index))
}

fn method_id(file: usize, method: usize) -> CodeObjectId {
    CodeObjectId::method(&format!("module_{}$_$Service$_$handler_{}", file, method))
}

fn document(file: usize) -> DocumentInfo {
    let uri = file_uri(file);
    DocumentInfo::new(
        uri.clone(),
        (0..METHODS_PER_FILE).map(|m| MethodInfo {
            id: method_id(file, m),
            name: format!("handler_{}", m),
            containing_class: "Service".to_string(),
            containing_namespace: format!("module_{}", file),
            containing_file_uri: uri.clone(),
            source_offset: m * 120,
            spans: Vec::new(),
        }),
    )
}

fn summaries(file: usize, score: i32) -> Vec<CodeObjectSummary> {
    (0..METHODS_PER_FILE)
        .map(|m| CodeObjectSummary::Method {
            code_object_id: method_id(file, m),
            insights_count: 1,
            errors_count: 0,
            score,
        })
        .collect()
}

/// Cache with `files` open files, each with summaries
fn populated_cache(rt: &Runtime, files: usize) -> DocumentInfoCache {
    rt.block_on(async {
        let cache = DocumentInfoCache::new();
        for f in 0..files {
            cache.upsert(&file_uri(f), document(f)).await;
            cache
                .update_summaries(&file_uri(f), 0, "prod", Some(summaries(f, 50)))
                .await;
        }
        cache
    })
}

fn benchmark_lookups(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("lookup");

    for file_count in [10, 100, 500].iter() {
        let cache = populated_cache(&rt, *file_count);
        let last = file_count - 1;

        group.bench_with_input(
            BenchmarkId::new("find_method_info", file_count),
            file_count,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    cache
                        .find_method_info(black_box(&file_uri(last)), &method_id(last, 7))
                        .await
                })
            },
        );

        // worst case: the owner is scanned for last
        group.bench_with_input(
            BenchmarkId::new("find_container_owning_code_object", file_count),
            file_count,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    cache
                        .find_container_owning_code_object(black_box(&method_id(last, 7)))
                        .await
                })
            },
        );
    }

    group.finish();
}

fn benchmark_updates(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("update");
    let cache = populated_cache(&rt, 100);

    group.bench_function("update_summaries", |b| {
        let mut score = 0;
        b.to_async(&rt).iter(|| {
            score += 1;
            let fetched = summaries(42, score);
            let cache = &cache;
            async move {
                cache
                    .update_summaries(&file_uri(42), 0, "prod", black_box(Some(fetched)))
                    .await
            }
        })
    });

    group.bench_function("upsert_generation", |b| {
        let mut generation = 0;
        b.to_async(&rt).iter(|| {
            generation += 1;
            let doc = document(7);
            let cache = &cache;
            async move {
                cache
                    .upsert_generation(&file_uri(7), generation, black_box(doc))
                    .await
            }
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_lookups, benchmark_updates);
criterion_main!(benches);
