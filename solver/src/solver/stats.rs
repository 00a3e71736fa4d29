use std::fmt::{Display, Error, Formatter};
use std::time::{Duration, Instant};

/// Monotonic counters of the search driver.
///
/// Counters only ever increase; components that need per-run figures (limits,
/// the search log) capture an offset at `EnterSearch` and subtract.
#[derive(Clone)]
pub struct Stats {
    pub num_branches: u64,
    pub num_failures: u64,
    pub num_solutions: u64,
    pub num_restarts: u64,
    pub num_neighbors: u64,
    pub num_filtered_neighbors: u64,
    pub num_accepted_neighbors: u64,
    /// Origin of the wall clock, set when the stats are created.
    clock: Instant,
}

impl Stats {
    pub fn new() -> Stats {
        Stats {
            num_branches: 0,
            num_failures: 0,
            num_solutions: 0,
            num_restarts: 0,
            num_neighbors: 0,
            num_filtered_neighbors: 0,
            num_accepted_neighbors: 0,
            clock: Instant::now(),
        }
    }

    pub fn add_branch(&mut self) {
        self.num_branches += 1;
    }

    pub fn add_failure(&mut self) {
        self.num_failures += 1;
    }

    pub fn add_solution(&mut self) {
        self.num_solutions += 1;
    }

    pub fn add_restart(&mut self) {
        self.num_restarts += 1;
    }

    /// Time elapsed since the creation of the solver.
    pub fn wall_time(&self) -> Duration {
        self.clock.elapsed()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        fn label(f: &mut Formatter<'_>, label: &str) -> Result<(), Error> {
            write!(f, "{label:<20}: ")
        }
        let time = self.wall_time();

        label(f, "solutions")?;
        writeln!(f, "{:<12}", self.num_solutions)?;

        label(f, "restarts")?;
        writeln!(f, "{:<12}", self.num_restarts)?;

        label(f, "branches")?;
        writeln!(
            f,
            "{:<12} ({:.0} /sec)",
            self.num_branches,
            (self.num_branches as f64) / time.as_secs_f64()
        )?;

        label(f, "failures")?;
        writeln!(
            f,
            "{:<12} ({:.0} /sec)",
            self.num_failures,
            (self.num_failures as f64) / time.as_secs_f64()
        )?;

        if self.num_neighbors > 0 {
            label(f, "neighbors")?;
            writeln!(
                f,
                "{:<12} (filtered: {}, accepted: {})",
                self.num_neighbors, self.num_filtered_neighbors, self.num_accepted_neighbors
            )?;
        }

        label(f, "wall time")?;
        writeln!(f, "{:.6} s", time.as_secs_f64())?;

        Ok(())
    }
}
