use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use layer_guardian::domain::model::{ExportedSymbol, ParseStatus, RawImport, SymbolKind};
use layer_guardian::{
    CancelFlag, DependencyGraph, GuardianConfig, Layer, LayerAssignment, Module, ModuleId,
    RuleSet,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

const LAYERS: [(&str, Layer); 4] = [
    ("domain", Layer::Domain),
    ("application", Layer::Application),
    ("infrastructure", Layer::Infrastructure),
    ("interfaces", Layer::Interfaces),
];

fn segments(path: &str) -> Vec<String> {
    path.split("::").map(str::to_string).collect()
}

/// `per_layer` modules in each layer; every module imports two inner-layer neighbours
fn build_modules(per_layer: usize) -> Vec<Module> {
    let mut modules = Vec::with_capacity(per_layer * LAYERS.len());
    for (depth, (dir, layer)) in LAYERS.iter().enumerate() {
        for i in 0..per_layer {
            let name = format!("m{i:05}");
            let mut imports = Vec::new();
            if depth > 0 {
                let (inner, _) = LAYERS[depth - 1];
                for offset in [0, 7] {
                    let target = format!("m{:05}", (i + offset) % per_layer);
                    imports.push(RawImport {
                        segments: segments(&format!("crate::{inner}::{target}::Item")),
                        local_name: Some("Item".to_string()),
                        is_glob: false,
                        is_reexport: false,
                        line: Some(1 + offset as u32),
                    });
                }
            }
            imports.push(RawImport {
                segments: segments("serde::Serialize"),
                local_name: Some("Serialize".to_string()),
                is_glob: false,
                is_reexport: false,
                line: Some(10),
            });

            modules.push(Module {
                id: ModuleId::new(format!("crate::{dir}::{name}")),
                path: PathBuf::from(format!("src/{dir}/{name}.rs")),
                crate_name: "crate".to_string(),
                layer: LayerAssignment::Layer(*layer),
                status: ParseStatus::Parsed,
                exports: vec![ExportedSymbol::new("Item", SymbolKind::Struct)],
                imports,
                error_types: Vec::new(),
                functions: Vec::new(),
                module_identifiers: BTreeSet::new(),
            });
        }
    }
    modules
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for per_layer in [100usize, 1_000] {
        let modules = build_modules(per_layer);
        group.bench_with_input(BenchmarkId::from_parameter(per_layer * LAYERS.len()), &modules, |b, modules| {
            b.iter(|| {
                let graph = DependencyGraph::build(black_box(modules.clone())).unwrap();
                black_box(graph.edges().len())
            })
        });
    }
    group.finish();
}

fn bench_rule_evaluation(c: &mut Criterion) {
    let graph = DependencyGraph::build(build_modules(1_000)).unwrap();
    let rules = RuleSet::from_config(&GuardianConfig::default()).unwrap();
    let cancel = CancelFlag::new();

    c.bench_function("rule_evaluation_4000_modules", |b| {
        b.iter(|| black_box(rules.evaluate(&graph, &cancel).unwrap().len()))
    });
}

criterion_group!(benches, bench_graph_build, bench_rule_evaluation);
criterion_main!(benches);
