use std::time::{Duration, Instant};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    FlushChunks,
    EvictChunks,
    SaveStats,
    SaveIdentities,
    PushStats,
}

#[derive(Debug)]
struct Periodic {
    job: Job,
    every: Duration,
    next_due: Instant,
}

/// Background jobs, each on its own interval.
#[derive(Debug)]
pub struct Schedule {
    tasks: Vec<Periodic>,
}
impl Schedule {
    pub fn new(config: &Config, start: Instant) -> Self {
        let save = |job| Periodic {
            job,
            every: config.save_interval,
            next_due: start + config.save_interval,
        };
        Self {
            tasks: vec![
                save(Job::FlushChunks),
                save(Job::EvictChunks),
                save(Job::SaveStats),
                save(Job::SaveIdentities),
                // clients get stats straight away, then on every tick
                Periodic {
                    job: Job::PushStats,
                    every: config.stats_interval,
                    next_due: start,
                },
            ],
        }
    }
    pub fn next_due(&self) -> Instant {
        self.tasks
            .iter()
            .map(|t| t.next_due)
            .min()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(1))
    }
    /// Jobs due at `now`, in declaration order. Missed ticks are not replayed.
    pub fn due(&mut self, now: Instant) -> Vec<Job> {
        let mut due = vec![];
        for task in &mut self.tasks {
            if task.next_due <= now {
                due.push(task.job);
                task.next_due += task.every;
                if task.next_due <= now {
                    task.next_due = now + task.every;
                }
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_push_fires_first_then_everything_on_save() {
        let config = Config::default();
        let start = Instant::now();
        let mut schedule = Schedule::new(&config, start);
        assert_eq!(schedule.next_due(), start);
        assert_eq!(schedule.due(start), vec![Job::PushStats]);
        assert_eq!(schedule.next_due(), start + Duration::from_secs(5));
        assert!(schedule.due(start + Duration::from_secs(4)).is_empty());

        let at = start + Duration::from_secs(30);
        assert_eq!(
            schedule.due(at),
            vec![Job::FlushChunks, Job::EvictChunks, Job::SaveStats, Job::SaveIdentities, Job::PushStats]
        );
        assert_eq!(schedule.next_due(), at + Duration::from_secs(5));
    }
}
