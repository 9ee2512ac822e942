//! Orchestrator behavior with a stubbed driver: scheme filtering, silent
//! dropping of empty observations, writer fan-out counts, and run-wide
//! cancellation on a missing browser.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use webwitness::{Driver, DriverError, Observation, Options, Runner, Writer};

/// Scripted driver: records every witnessed target and answers according to
/// a per-target script.
struct StubDriver {
    witnessed: Mutex<Vec<String>>,
    respond: Box<dyn Fn(&str) -> Result<Observation, DriverError> + Send + Sync>,
}

impl StubDriver {
    fn new(
        respond: impl Fn(&str) -> Result<Observation, DriverError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            witnessed: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn witnessed(&self) -> Vec<String> {
        self.witnessed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn witness(&self, target: &str) -> Result<Observation, DriverError> {
        self.witnessed.lock().unwrap().push(target.to_string());
        (self.respond)(target)
    }

    async fn close(&self) {}
}

/// Writer that counts its invocations.
struct CountingWriter {
    calls: AtomicUsize,
}

impl CountingWriter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Writer for CountingWriter {
    async fn write(&self, _observation: &Observation) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn quiet_options() -> Options {
    let mut options = Options::default();
    options.logging.silence = true;
    options.logging.log_scan_errors = false;
    options.scan.screenshot_skip_disk = true;
    options.scan.workers = 2;
    options
}

fn ok_observation(target: &str) -> Observation {
    let mut obs = Observation::new(target);
    obs.response_code = 200;
    obs.final_url = target.to_string();
    obs
}

#[tokio::test]
async fn test_rejected_schemes_never_reach_the_driver() {
    let driver = StubDriver::new(|t| Ok(ok_observation(t)));
    let runner = Runner::new(quiet_options(), driver.clone(), Vec::new()).expect("runner");

    let targets = runner.targets();
    tokio::spawn(async move {
        for target in [
            "file:///etc/passwd",
            "ftp://example.com/",
            "not a url",
            "http://ok.example.com/",
        ] {
            targets.send(target.to_string()).await.expect("send");
        }
    });

    runner.run().await;

    assert_eq!(driver.witnessed(), vec!["http://ok.example.com/"]);
}

#[tokio::test]
async fn test_each_writer_receives_every_kept_observation_once() {
    let driver = StubDriver::new(|t| Ok(ok_observation(t)));
    let first = CountingWriter::new();
    let second = CountingWriter::new();
    let runner = Runner::new(
        quiet_options(),
        driver.clone(),
        vec![first.clone(), second.clone()],
    )
    .expect("runner");

    let targets = runner.targets();
    tokio::spawn(async move {
        for i in 0..5 {
            targets
                .send(format!("http://host{i}.example.com/"))
                .await
                .expect("send");
        }
    });

    runner.run().await;

    assert_eq!(driver.witnessed().len(), 5);
    assert_eq!(first.calls(), 5);
    assert_eq!(second.calls(), 5);
}

#[tokio::test]
async fn test_zero_status_observations_are_dropped_silently() {
    // Targets ending in "dead" get a response_code of 0, as if nothing
    // answered.
    let driver = StubDriver::new(|t| {
        if t.ends_with("dead/") {
            let mut obs = Observation::new(t);
            obs.failed = true;
            obs.failed_reason = "net::ERR_NAME_NOT_RESOLVED".to_string();
            Ok(obs)
        } else {
            Ok(ok_observation(t))
        }
    });
    let writer = CountingWriter::new();
    let runner = Runner::new(quiet_options(), driver.clone(), vec![writer.clone()])
        .expect("runner");

    let targets = runner.targets();
    tokio::spawn(async move {
        for target in [
            "http://alive.example.com/",
            "http://dead/",
            "http://also-alive.example.com/",
            "http://another.dead/",
        ] {
            targets.send(target.to_string()).await.expect("send");
        }
    });

    runner.run().await;

    assert_eq!(driver.witnessed().len(), 4, "all valid targets witnessed");
    assert_eq!(writer.calls(), 2, "only non-zero statuses written");
}

#[tokio::test]
async fn test_driver_errors_skip_the_target_but_not_the_run() {
    let driver = StubDriver::new(|t| {
        if t.contains("boom") {
            Err(DriverError::Cdp("tab crashed".to_string()))
        } else {
            Ok(ok_observation(t))
        }
    });
    let writer = CountingWriter::new();
    let runner =
        Runner::new(quiet_options(), driver.clone(), vec![writer.clone()]).expect("runner");

    let targets = runner.targets();
    tokio::spawn(async move {
        for target in [
            "http://boom.example.com/",
            "http://fine.example.com/",
        ] {
            targets.send(target.to_string()).await.expect("send");
        }
    });

    runner.run().await;

    assert_eq!(driver.witnessed().len(), 2);
    assert_eq!(writer.calls(), 1);
}

#[tokio::test]
async fn test_browser_not_found_cancels_all_workers() {
    let driver = StubDriver::new(|_| {
        Err(DriverError::BrowserNotFound(
            "exec: \"chrome\": file not found".to_string(),
        ))
    });
    let writer = CountingWriter::new();
    let runner =
        Runner::new(quiet_options(), driver.clone(), vec![writer.clone()]).expect("runner");

    let targets = runner.targets();
    let producer = tokio::spawn(async move {
        for i in 0..50 {
            if targets
                .send(format!("http://host{i}.example.com/"))
                .await
                .is_err()
            {
                // Workers are gone; the run was cancelled.
                return;
            }
        }
    });

    // The run must return within a bounded grace period even though the
    // producer had 50 targets queued up.
    tokio::time::timeout(Duration::from_secs(5), runner.run())
        .await
        .expect("run returned after cancellation");
    let _ = producer.await;

    assert!(
        driver.witnessed().len() < 50,
        "cancellation stopped the remaining targets"
    );
    assert_eq!(writer.calls(), 0);
}

#[tokio::test]
async fn test_writer_errors_do_not_stop_later_writers_or_targets() {
    struct FailingWriter;

    #[async_trait]
    impl Writer for FailingWriter {
        async fn write(&self, _observation: &Observation) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    let driver = StubDriver::new(|t| Ok(ok_observation(t)));
    let counting = CountingWriter::new();
    let runner = Runner::new(
        quiet_options(),
        driver.clone(),
        vec![Arc::new(FailingWriter), counting.clone()],
    )
    .expect("runner");

    let targets = runner.targets();
    tokio::spawn(async move {
        for i in 0..3 {
            targets
                .send(format!("http://host{i}.example.com/"))
                .await
                .expect("send");
        }
    });

    runner.run().await;

    // The failing writer never blocked the one after it.
    assert_eq!(counting.calls(), 3);
}
