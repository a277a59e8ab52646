use std::path::PathBuf;

use code_health::{
    CompiledConfig, DecisionPoints, FieldUsage, FileFacts, FunctionFacts, MethodFacts,
    PackageFacts, ProjectFacts, StructFacts, analyze_facts, extract_project,
};
use criterion::{Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

const MODULE: &str = "example.com/bench";

/// `packages` packages in a chain, each with a wide struct and a few functions
fn synthetic_facts(packages: usize) -> ProjectFacts {
    let mut facts = ProjectFacts::new(MODULE);

    for p in 0..packages {
        let mut pkg = PackageFacts::new(format!("pkg{}", p), format!("pkg{}", p));
        if p + 1 < packages {
            pkg.imports.insert(format!("{}/pkg{}", MODULE, p + 1));
        }
        pkg.imports.insert("serde".to_string());

        let fields: Vec<String> = (0..8).map(|f| format!("field{}", f)).collect();
        let mut service = StructFacts::new("Service", format!("pkg{}/service.rs", p)).with_fields(fields.clone());
        for m in 0..12 {
            let mut method = MethodFacts::new(format!("Service.op{}", m), m % 3 != 0)
                .with_field(&fields[m % 8], FieldUsage::Read)
                .with_field(&fields[(m * 3) % 8], FieldUsage::Write);
            if m > 0 {
                method = method.with_call(format!("Service.op{}", m - 1), 1);
            }
            service = service.with_method(method);
        }
        pkg.structs.push(service);

        for f in 0..10 {
            let mut function = FunctionFacts::new(format!("handler{}", f), format!("pkg{}/handlers.rs", p));
            function.body_line_count = 10 + f;
            function.decision_points = DecisionPoints {
                if_statements: f,
                loops: f / 2,
                ..DecisionPoints::default()
            };
            if f > 0 {
                function.callees.insert(format!("handler{}", f - 1));
            }
            pkg.functions.push(function);
        }
        pkg.files.push(FileFacts {
            path: format!("pkg{}/service.rs", p),
            line_count: 300,
        });
        facts.packages.push(pkg);
    }

    facts
}

fn create_test_crate() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::write(root.join("Cargo.toml"), "[package]\nname = \"bench-crate\"\nversion = \"0.1.0\"\n").unwrap();

    let src = root.join("src");
    std::fs::create_dir_all(&src).unwrap();
    let mut lib = String::new();
    for i in 0..10 {
        lib.push_str(&format!("pub mod module{};\n", i));

        let dir = src.join(format!("module{}", i));
        std::fs::create_dir_all(&dir).unwrap();
        let next = (i + 1) % 10;
        let content = format!(
            r#"
use crate::module{next}::Store{next};

pub struct Store{i} {{
    items: Vec<i32>,
    total: i64,
    name: String,
}}

impl Store{i} {{
    pub fn add(&mut self, value: i32) {{
        if value > 0 && value < 1000 {{
            self.items.push(value);
            self.total += value as i64;
        }}
        self.rename();
    }}

    fn rename(&mut self) {{
        for item in &self.items {{
            if *item > 10 {{
                self.name = format!("store-{{}}", item);
            }}
        }}
    }}

    pub fn link(&self, other: &Store{next}) -> usize {{
        match self.items.len() {{
            0 => 0,
            n => n + other.size(),
        }}
    }}

    pub fn size(&self) -> usize {{
        self.items.len()
    }}
}}
"#
        );
        std::fs::write(dir.join("mod.rs"), content).unwrap();
    }
    std::fs::write(src.join("lib.rs"), lib).unwrap();

    let root = root.to_path_buf();
    (temp_dir, root)
}

fn benchmark_pipeline(c: &mut Criterion) {
    let config = CompiledConfig::defaults();
    let facts = synthetic_facts(50);

    c.bench_function("analyze_facts_50_packages", |b| {
        b.iter(|| analyze_facts(&facts, &config, None).unwrap())
    });
}

fn benchmark_extraction(c: &mut Criterion) {
    let config = CompiledConfig::defaults();
    let (_temp_dir, root) = create_test_crate();

    c.bench_function("extract_project_10_modules", |b| {
        b.iter(|| extract_project(&root, &config).unwrap())
    });
}

criterion_group!(benches, benchmark_pipeline, benchmark_extraction);
criterion_main!(benches);
