use std::path::Path;

use phase_bench::{
    driver::{IterationDriver, RunOutcome},
    metrics::Phase,
    output::{CsvWriters, SummaryWriter},
};

/// A report with an `Inference` and a `Total` block whose values scale with `n`
fn report(n: u32) -> String {
    format!(
        "Creating the Wasm environment took: 1.2ms\n\
         ============= Inference Metrics =============\n\
         Wall Clock Time: {n}0ms\n\
         User time: {n}s\n\
         System time: {n}00µs\n\
         Max RSS: {n}001 bytes\n\
         CPU Usage: {n}5%\n\
         =======================================\n\
         ============= Total Metrics =============\n\
         CPU Usage: 99%\n\
         User time: 1ms\n\
         System time: 1ms\n\
         Wall Clock Time: 2ms\n\
         =======================================\n",
        n = n
    )
}

/// Run three iterations where the second benchmark run fails
fn run_with_failure(dir: &Path) -> RunOutcome {
    let mut iteration = 0;
    let benchmark = move |_trace: bool, path: &Path| -> eyre::Result<()> {
        iteration += 1;
        if iteration == 2 {
            eyre::bail!("benchmark crashed");
        }
        std::fs::write(path, report(iteration))?;
        Ok(())
    };

    IterationDriver::new(
        benchmark,
        dir.join("benchmark_output.txt"),
        false,
        CsvWriters::create(dir).unwrap(),
        SummaryWriter::create(dir.join("stats_summary.txt")).unwrap(),
    )
    .run(3)
    .unwrap()
}

#[test]
fn failed_iteration_contributes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_with_failure(dir.path());

    assert_eq!(outcome.stats.iterations, 3);
    assert_eq!(outcome.stats.failed_runs, 1);
    assert_eq!(outcome.stats.accepted_blocks, 2);
    assert_eq!(outcome.stats.rejected_blocks, 2);

    let csv = std::fs::read_to_string(dir.path().join("inference.csv")).unwrap();
    assert_eq!(
        csv,
        "user_time,system_time,cpu_percent,wallclock_time,max_rss\n\
         1000.000,0.100,15.00%,10.000,1001\n\
         3000.000,0.300,35.00%,30.000,3001\n"
    );

    // The Total blocks never have a Max RSS line
    let total = std::fs::read_to_string(dir.path().join("total.csv")).unwrap();
    assert_eq!(total.lines().count(), 1);
}

#[test]
fn averages_use_the_iteration_counter_as_weight() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_with_failure(dir.path());
    let inference = outcome.averages.get(Phase::Inference);

    // Iteration 3 weighs the previous average as two observations even
    // though iteration 2 produced none.
    assert_eq!(inference.wall_clock_ms, (2. * 10. + 30.) / 3.);
    assert_eq!(inference.user_time_ms, (2. * 1000. + 3000.) / 3.);
    assert_eq!(inference.max_rss_bytes, (2 * 1001 + 3001) / 3);
    assert_eq!(inference.observations, 2);

    assert_eq!(outcome.averages.get(Phase::Total).observations, 0);
}

#[test]
fn summary_is_reproducible() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    run_with_failure(first.path());
    run_with_failure(second.path());

    let read = |dir: &Path| std::fs::read_to_string(dir.join("stats_summary.txt")).unwrap();
    let summary = read(first.path());
    assert_eq!(summary, read(second.path()));
    assert!(summary.contains(
        "====Inference Metrics====\n\
         Average Wall Clock Time: 16.667 ms\n\
         Average User Time: 1666.667 ms\n\
         Average System Time: 0.167 ms\n\
         Average Cpu Usage: 21.67 %\n\
         Average Max RSS: 1667\n"
    ));
}
