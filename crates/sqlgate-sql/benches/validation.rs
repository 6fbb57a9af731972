//! Benchmarks for the parse -> validate -> qualify path
//!
//! Measures how the lexical pipeline scales with wide projections and
//! deep CTE chains, the shapes analytical questions tend to produce.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlgate_core::{ColumnDescriptor, SchemaModel, TableDescriptor};
use sqlgate_sql::{ColumnValidator, QualificationEnforcer, StructuralParser};

/// Schema with `num_tables` tables of `num_columns` columns each
fn generate_schema(num_tables: usize, num_columns: usize) -> SchemaModel {
    let mut schema = SchemaModel::new();
    for t in 0..num_tables {
        let mut table = TableDescriptor::new(format!("table_{}", t))
            .with_column(ColumnDescriptor::new("id", "INTEGER").primary_key());
        for c in 0..num_columns {
            table = table.with_column(ColumnDescriptor::new(format!("t{}_col_{}", t, c), "TEXT"));
        }
        schema.add_table(table).unwrap();
    }
    schema
}

/// A chain of `num_ctes` CTEs, each projecting `num_columns` columns from the previous one
fn generate_cte_chain(num_ctes: usize, num_columns: usize) -> String {
    let base_columns: Vec<String> = (0..num_columns)
        .map(|c| format!("x.t0_col_{} AS c{}", c, c))
        .collect();
    let mut ctes = vec![format!("cte_0 AS (SELECT {} FROM table_0 x)", base_columns.join(", "))];

    for n in 1..num_ctes {
        let columns: Vec<String> = (0..num_columns)
            .map(|c| format!("prev.c{}", c))
            .collect();
        ctes.push(format!(
            "cte_{} AS (SELECT {} FROM cte_{} prev WHERE prev.c0 LIKE '%value%')",
            n,
            columns.join(", "),
            n - 1
        ));
    }

    let last = num_ctes - 1;
    format!(
        "WITH {} SELECT f.c0, COUNT(*) AS n FROM cte_{} f GROUP BY f.c0 ORDER BY n DESC LIMIT 10;",
        ctes.join(", "),
        last
    )
}

/// A join across `num_tables` tables selecting every column unqualified
fn generate_wide_join(num_tables: usize, num_columns: usize) -> String {
    let columns: Vec<String> = (0..num_tables)
        .flat_map(|t| (0..num_columns).map(move |c| format!("t{}_col_{}", t, c)))
        .collect();
    let joins: Vec<String> = (1..num_tables)
        .map(|t| format!("JOIN table_{} j{} ON j{}.id = j0.id", t, t, t))
        .collect();
    format!("SELECT {} FROM table_0 j0 {};", columns.join(", "), joins.join(" "))
}

fn bench_validate_cte_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_cte_chain");
    let schema = generate_schema(1, 20);

    for num_ctes in [1, 5, 20].iter() {
        let sql = generate_cte_chain(*num_ctes, 20);
        group.bench_with_input(BenchmarkId::from_parameter(num_ctes), num_ctes, |b, _| {
            b.iter(|| {
                let parsed = StructuralParser::new().parse(&sql);
                black_box(ColumnValidator::new().validate(&parsed, &schema, &sql))
            });
        });
    }

    group.finish();
}

fn bench_qualify_wide_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("qualify_wide_join");

    for num_tables in [2, 5, 10].iter() {
        let schema = generate_schema(*num_tables, 10);
        let sql = generate_wide_join(*num_tables, 10);
        group.bench_with_input(BenchmarkId::from_parameter(num_tables), num_tables, |b, _| {
            b.iter(|| black_box(QualificationEnforcer::new().enforce(&sql, &schema)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_validate_cte_chain, bench_qualify_wide_join);
criterion_main!(benches);
