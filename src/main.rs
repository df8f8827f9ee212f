use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use checkserv::schedule::Schedule;

/// Asks the loop to exit and wakes it.
fn request_stop(stop: &AtomicBool, notifier: &polling::Poller) {
    stop.store(true, Ordering::Release);
    if let Err(e) = notifier.notify() {
        log::error!("failed to wake the server: {e}");
    }
}

/// Reads console commands until stdin closes. `stop` asks the loop to exit.
fn console(stop: Arc<AtomicBool>, notifier: Arc<polling::Poller>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "" => {}
            "stop" => return request_stop(&stop, &notifier),
            other => log::warn!("unknown command {other:?}, try `stop`"),
        }
    }
    log::info!("console closed, send SIGINT or SIGTERM to stop");
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let config = checkserv::Config::from_env(std::env::args_os())?;
    log::debug!("{config:?}");

    let mut world = checkserv::World::open(&config)?;
    let mut network = checkserv::Network::new(&config)?;
    let mut schedule = Schedule::new(&config, Instant::now());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let (stop, notifier) = (Arc::clone(&stop), network.notifier());
        ctrlc::set_handler(move || {
            log::info!("received termination signal");
            request_stop(&stop, &notifier);
        })
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    }
    {
        let (stop, notifier) = (Arc::clone(&stop), network.notifier());
        std::thread::Builder::new()
            .name("console".into())
            .spawn(move || console(stop, notifier))?;
    }

    while !stop.load(Ordering::Acquire) {
        // queued chores run between polls without starving the sockets
        let deadline = if world.has_background_work() {
            Instant::now()
        } else {
            schedule.next_due()
        };
        network.process_packets_until(deadline, &mut world);

        for job in schedule.due(Instant::now()) {
            log::trace!("running {job:?}");
            world.run_job(job, &mut network.inboxes());
        }
        world.background_step();
        network.flush_pending(&mut world);
    }

    log::info!("shutting down");
    network.shutdown(&mut world);
    world.shutdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_request_wakes_a_blocked_loop() {
        let poller = Arc::new(polling::Poller::new().unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let (poller, stop) = (Arc::clone(&poller), Arc::clone(&stop));
            std::thread::spawn(move || {
                let mut events = vec![];
                while !stop.load(Ordering::Acquire) {
                    poller.wait(&mut events, Some(Duration::from_secs(30))).unwrap();
                }
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        request_stop(&stop, &poller);
        waiter.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
