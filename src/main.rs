fn main() {
    phase_bench::cli::run();
}
