//! Worker-pool helper shared by the embarrassingly parallel stages.

use tracing::warn;

/// Run `job` inside a Rayon pool of `workers` threads.
///
/// If the pool cannot be built, `job` runs on the caller's thread and any
/// parallel iterators inside it fall back to the global pool.
pub fn install<R, F>(workers: usize, job: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(job),
        Err(e) => {
            warn!("could not build a {workers}-thread pool, using the global pool: {e}");
            job()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn pool_runs_job_and_returns_result() {
        let total: u64 = install(2, || (1..=100u64).into_par_iter().sum());
        assert_eq!(total, 5050);
    }

    #[test]
    fn zero_workers_is_clamped() {
        assert_eq!(install(0, || rayon::current_num_threads()), 1);
    }
}
