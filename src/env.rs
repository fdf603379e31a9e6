//! Runtime environment report.

use std::num::NonZeroUsize;
use std::thread;

/// What the process is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Crate version.
    pub version: &'static str,
    /// Hardware accelerators visible to the model. Always empty: training runs on the CPU.
    pub accelerators: Vec<String>,
    /// Matrix-product implementation compiled in.
    pub gemm_backend: &'static str,
    pub cpu_parallelism: usize,
}

impl Environment {
    pub fn probe() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            accelerators: Vec::new(),
            gemm_backend: gemm_backend(),
            cpu_parallelism: thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

fn gemm_backend() -> &'static str {
    if cfg!(feature = "matrixmultiply") {
        "matrixmultiply"
    } else {
        "naive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_cpu_only() {
        let env = Environment::probe();
        assert!(env.accelerators.is_empty());
        assert!(env.cpu_parallelism >= 1);
        assert_eq!(env.version, env!("CARGO_PKG_VERSION"));
    }
}
