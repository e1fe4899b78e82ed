//! Benchmarks for the core engine: parse, serialize, and page editing
//! on synthetic multi-page documents.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::hint::black_box;

use bytes::Bytes;
use pdf_smith::editor::{compress, extract_pages, merge_documents, SplitMode};
use pdf_smith::writer::{DocumentWriter, ObjectSerializer};
use pdf_smith::{Document, Object, ObjectRef};

/// Build an n-page document with mildly repetitive content streams.
fn synthetic_document(page_count: usize) -> Document {
    let mut objects: HashMap<ObjectRef, Object> = HashMap::new();
    let catalog = ObjectRef::new(1, 0);
    let pages_root = ObjectRef::new(2, 0);

    let mut kids = Vec::new();
    let mut next = 3u32;
    for n in 1..=page_count {
        let page_ref = ObjectRef::new(next, 0);
        let stream_ref = ObjectRef::new(next + 1, 0);
        next += 2;

        let content = format!("BT /F1 12 Tf 50 750 Td (page {}) Tj ET\n", n).repeat(40);
        objects.insert(
            page_ref,
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Page")),
                ("Parent", Object::Reference(pages_root)),
                ("MediaBox", ObjectSerializer::rect(0.0, 0.0, 612.0, 792.0)),
                ("Contents", Object::Reference(stream_ref)),
            ]),
        );
        objects.insert(
            stream_ref,
            Object::Stream {
                dict: HashMap::new(),
                data: Bytes::from(content),
            },
        );
        kids.push(Object::Reference(page_ref));
    }

    objects.insert(
        pages_root,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Count", ObjectSerializer::integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]),
    );
    objects.insert(
        catalog,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Catalog")),
            ("Pages", Object::Reference(pages_root)),
        ]),
    );

    let writer = DocumentWriter::from_objects((1, 7), &objects, catalog, None).unwrap();
    Document::parse(writer.to_bytes().unwrap()).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for pages in [10, 100, 500] {
        let bytes = synthetic_document(pages).raw_bytes().clone();
        group.bench_with_input(BenchmarkId::from_parameter(pages), &bytes, |b, bytes| {
            b.iter(|| {
                let mut doc = Document::parse(black_box(bytes.clone())).unwrap();
                doc.page_count().unwrap()
            })
        });
    }

    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");

    for pages in [10, 100, 500] {
        group.bench_with_input(
            BenchmarkId::from_parameter(pages),
            &pages,
            |b, &pages| {
                let mut doc = synthetic_document(pages);
                b.iter(|| {
                    let writer = DocumentWriter::from_document(black_box(&mut doc)).unwrap();
                    writer.to_bytes().unwrap()
                })
            },
        );
    }

    group.finish();
}

fn bench_page_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_edit");

    group.bench_function("extract_10_of_100", |b| {
        let mut doc = synthetic_document(100);
        b.iter(|| extract_pages(black_box(&mut doc), 40, 49).unwrap())
    });

    group.bench_function("merge_two_50_page", |b| {
        b.iter_batched(
            || [synthetic_document(50), synthetic_document(50)],
            |mut docs| merge_documents(black_box(&mut docs)).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });

    group.bench_function("split_100_individual", |b| {
        let mut doc = synthetic_document(100);
        b.iter(|| {
            pdf_smith::editor::split_document(black_box(&mut doc), &SplitMode::Individual)
                .unwrap()
        })
    });

    group.bench_function("compress_100_pages", |b| {
        let mut doc = synthetic_document(100);
        b.iter(|| compress(black_box(&mut doc), 6).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_serialize, bench_page_edit);
criterion_main!(benches);
