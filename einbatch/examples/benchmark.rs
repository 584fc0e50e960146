//! Benchmark of batched versus per-tree contraction.
//!
//! Run with: cargo run --release --example benchmark -p einbatch
//!
//! Each scenario evaluates one population of contraction trees twice: once
//! with batching enabled and once with the group size threshold set so high
//! that every step runs as its own primitive call. The interesting column is
//! the number of primitive calls; with a dispatch-heavy backend that count
//! is what batching amortizes. The bundled nested-loop backend does the same
//! arithmetic either way, so wall times here mostly show scheduling cost.

use std::time::Instant;

use einbatch::{
    batch_contract_with_report, linear_tree, parse_eincode, BatchPolicy, ContractionTree,
    EngineError, NaiveContractor,
};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ScenarioResult {
    name: String,
    trees: usize,
    rounds: usize,
    batched_calls: usize,
    per_tree_calls: usize,
    batched_ms: f64,
    per_tree_ms: f64,
}

fn random_tensor(shape: &[usize], rng: &mut SmallRng) -> ArrayD<f64> {
    let size: usize = shape.iter().product();
    let data: Vec<f64> = (0..size).map(|_| rng.random::<f64>()).collect();
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
}

/// Left-to-right product of `n` square matrices, e.g. "ab,bc,cd->ad".
fn chain_tree(n: usize, dim: usize, seed: u64) -> ContractionTree<char, f64> {
    assert!((2..=25).contains(&n), "chain length limited by the alphabet");
    let mut rng = SmallRng::seed_from_u64(seed);
    let segments: Vec<String> = (0..n)
        .map(|k| {
            let a = (b'a' + k as u8) as char;
            let b = (b'a' + k as u8 + 1) as char;
            format!("{}{}", a, b)
        })
        .collect();
    let expr = format!("{}->a{}", segments.join(","), (b'a' + n as u8) as char);
    let code = parse_eincode(&expr).unwrap();
    let ops = (0..n).map(|_| random_tensor(&[dim, dim], &mut rng)).collect();
    linear_tree(&code, ops)
}

fn run_scenario(
    name: &str,
    build: &dyn Fn() -> Vec<ContractionTree<char, f64>>,
) -> Result<ScenarioResult, EngineError> {
    let batched_policy = BatchPolicy::default();
    let per_tree_policy = BatchPolicy::default().with_min_group_size(usize::MAX);

    // Warmup, and check that both modes agree before timing anything.
    let (batched_out, _) =
        batch_contract_with_report(build(), &NaiveContractor, &batched_policy)?;
    let (per_tree_out, _) =
        batch_contract_with_report(build(), &NaiveContractor, &per_tree_policy)?;
    assert_eq!(batched_out, per_tree_out, "batched run changed the results");
    let trees = batched_out.len();

    let start = Instant::now();
    let (_, batched_report) =
        batch_contract_with_report(build(), &NaiveContractor, &batched_policy)?;
    let batched_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    let (_, per_tree_report) =
        batch_contract_with_report(build(), &NaiveContractor, &per_tree_policy)?;
    let per_tree_ms = start.elapsed().as_secs_f64() * 1000.0;

    println!("{}", "=".repeat(70));
    println!("Scenario: {}", name);
    println!("  Trees:            {}", trees);
    println!("  Rounds:           {}", batched_report.num_rounds());
    println!(
        "  Primitive calls:  {} batched vs {} per-tree",
        batched_report.primitive_calls(),
        per_tree_report.primitive_calls()
    );
    println!(
        "  Wall time:        {:.2} ms batched vs {:.2} ms per-tree",
        batched_ms, per_tree_ms
    );
    println!();

    Ok(ScenarioResult {
        name: name.to_string(),
        trees,
        rounds: batched_report.num_rounds(),
        batched_calls: batched_report.primitive_calls(),
        per_tree_calls: per_tree_report.primitive_calls(),
        batched_ms,
        per_tree_ms,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("{}", "=".repeat(70));
    println!("Batched contraction benchmark");
    println!("Backend: NaiveContractor (nested-loop reference)");
    println!("{}", "=".repeat(70));
    println!();

    let mut results = Vec::new();

    // Identical structure everywhere: every round fuses to one call.
    results.push(run_scenario("uniform_chains", &|| {
        (0..32).map(|k| chain_tree(6, 16, k)).collect()
    })?);

    // Three shape classes: each round splits into three groups.
    results.push(run_scenario("mixed_shapes", &|| {
        let mut trees = Vec::new();
        for k in 0..8 {
            trees.push(chain_tree(4, 12, 100 + k));
            trees.push(chain_tree(4, 16, 200 + k));
            trees.push(chain_tree(4, 20, 300 + k));
        }
        trees
    })?);

    // Every tree has its own shapes: nothing groups, pure overhead floor.
    results.push(run_scenario("lone_trees", &|| {
        (0..8).map(|k| chain_tree(4, 8 + k as usize, 400 + k)).collect()
    })?);

    println!("{}", "=".repeat(70));
    println!("SUMMARY");
    println!("{}", "=".repeat(70));
    println!();
    println!(
        "{:<16} {:>6} {:>7} │ {:>9} {:>9} │ {:>10} {:>10}",
        "Scenario", "Trees", "Rounds", "Calls (b)", "Calls (1)", "b ms", "1 ms"
    );
    println!(
        "{}",
        "─".repeat(31) + "─┼" + &"─".repeat(20) + "─┼" + &"─".repeat(22)
    );
    for r in &results {
        println!(
            "{:<16} {:>6} {:>7} │ {:>9} {:>9} │ {:>10.2} {:>10.2}",
            r.name, r.trees, r.rounds, r.batched_calls, r.per_tree_calls, r.batched_ms, r.per_tree_ms
        );
    }
    println!();

    let report = serde_json::json!({
        "backend": "NaiveContractor",
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
