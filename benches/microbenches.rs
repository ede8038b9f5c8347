//! Criterion microbenches for annotation decoding and label conversion.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::path::Path;

use pcbscan::label::voc::{from_voc_xml_slice, parse_voc_str};
use pcbscan::label::{convert, labels_to_text, parse_label_line};
use pcbscan::registry::ClassId;

// A board annotation with a handful of defects, in the shape of the PCB dataset.
const VOC_FIXTURE: &str = r#"<annotation>
  <folder>Short</folder>
  <filename>01_short_01.jpg</filename>
  <size><width>3034</width><height>1586</height><depth>3</depth></size>
  <object><name>short</name><bndbox><xmin>2282</xmin><ymin>1178</ymin><xmax>2332</xmax><ymax>1225</ymax></bndbox></object>
  <object><name>short</name><bndbox><xmin>1406</xmin><ymin>1168</ymin><xmax>1457</xmax><ymax>1228</ymax></bndbox></object>
  <object><name>short</name><bndbox><xmin>611</xmin><ymin>281</ymin><xmax>665</xmax><ymax>333</ymax></bndbox></object>
  <object><name>short</name><bndbox><xmin>2479</xmin><ymin>325</ymin><xmax>2525</xmax><ymax>377</ymax></bndbox></object>
  <object><name>short</name><bndbox><xmin>1788</xmin><ymin>630</ymin><xmax>1839</xmax><ymax>679</ymax></bndbox></object>
</annotation>
"#;

const PREDICTION_LINE: &str = "3 0.760464 0.757566 0.016480 0.029634 0.873";

fn bench_voc_parse(c: &mut Criterion) {
    let bytes = VOC_FIXTURE.as_bytes();
    let mut group = c.benchmark_group("voc_parse");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("parse_voc_str", |b| {
        b.iter(|| {
            let annotation = parse_voc_str(black_box(VOC_FIXTURE), Path::new("bench.xml")).unwrap();
            black_box(annotation)
        })
    });

    group.bench_function("from_voc_xml_slice", |b| {
        b.iter(|| black_box(from_voc_xml_slice(black_box(bytes)).unwrap()))
    });

    group.finish();
}

/// Benchmark conversion of a decoded annotation to label-file text.
///
/// The annotation is parsed once outside the loop so only normalization and
/// formatting are measured.
fn bench_label_text(c: &mut Criterion) {
    let annotation = parse_voc_str(VOC_FIXTURE, Path::new("bench.xml")).unwrap();
    let mut group = c.benchmark_group("label_convert");
    group.throughput(Throughput::Elements(annotation.objects.len() as u64));

    group.bench_function("convert_and_render", |b| {
        b.iter(|| {
            let labels = convert(black_box(&annotation), 3034, 1586, ClassId::new(3));
            black_box(labels_to_text(&labels))
        })
    });

    group.finish();
}

fn bench_prediction_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("label_parse");

    group.bench_function("parse_label_line", |b| {
        b.iter(|| {
            let row = parse_label_line(black_box(PREDICTION_LINE), Path::new("bench.txt"), 1).unwrap();
            black_box(row)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_voc_parse,
    bench_label_text,
    bench_prediction_line
);
criterion_main!(benches);
