/// Default engine binary, as produced by the engine's wasm build.
pub const DEFAULT_MODULE_PATH: &str = "icl_runtime_bg.wasm";
/// Default fuel level per bridge call (100 million instructions)
pub const DEFAULT_FUEL_LEVEL: u64 = 100_000_000;
/// Minimum allowed fuel level (1 million instructions)
pub const MIN_FUEL_LEVEL: u64 = 1_000_000;
/// Maximum allowed fuel level (500 million instructions) - security limit
pub const MAX_FUEL_LEVEL: u64 = 500_000_000;
/// Maximum allowed engine binary size (16 MB)
pub const MAX_MODULE_BYTES: usize = 16 * 1024 * 1024;

/// Iterations used by the determinism check when none are requested.
pub const DEFAULT_DETERMINISM_ITERATIONS: usize = 10;
/// Upper bound on determinism iterations.
pub const MAX_DETERMINISM_ITERATIONS: usize = 1000;

/// LCS table budget: (m+1)*(n+1) cells, roughly a 2000x2000-line diff.
pub const DEFAULT_MAX_DIFF_CELLS: usize = 4_000_000;
