//! Background simulation of a live instrument.
//!
//! Two long-lived tasks run against the shared [`ChannelStore`]:
//!
//! - **Voltage sampler**: every `sample_interval` units, draws a fresh reading
//!   for each Measuring or Busy channel from its range.
//! - **State perturber**: sleeps a random `[perturb_interval_min,
//!   perturb_interval_max]` units, then rolls for every Measuring channel,
//!   occasionally faulting it or making it Busy.
//!
//! Each Busy transition schedules its own short-lived recovery task addressed
//! by [`ChannelId`]. After `busy_recovery_delay` units it resets the channel to
//! Measuring if, and only if, the channel is still Busy at that moment.
//!
//! All three kinds of task stop on the scheduler's shutdown signal. The two
//! loops are joined by [`SimulationScheduler::shutdown`]; recovery tasks are
//! not joined but hold their own `Arc` to the store.

use super::channel::{ChannelId, ChannelState};
use super::rng::SimRng;
use super::state_machine::Perturbation;
use super::store::ChannelStore;
use crate::config::SimulationConfig;
use crate::error::AppResult;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owner of the sampler and perturber tasks.
pub struct SimulationScheduler {
    shutdown_tx: watch::Sender<bool>,
    sampler: Option<JoinHandle<()>>,
    perturber: Option<JoinHandle<()>>,
}

impl SimulationScheduler {
    /// Start both background loops. Must be called inside a tokio runtime.
    ///
    /// The configuration is validated first so neither loop can start with
    /// an empty perturbation interval or a zero period.
    pub fn spawn(store: Arc<ChannelStore>, config: SimulationConfig) -> AppResult<Self> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let rng = Arc::new(SimRng::new(config.seed));

        let sampler = tokio::spawn(run_sampler(
            store.clone(),
            rng.clone(),
            config.sample_period(),
            shutdown_rx.clone(),
        ));
        let perturber = tokio::spawn(run_perturber(store, rng, config, shutdown_rx));

        info!("Simulation scheduler started");
        Ok(Self {
            shutdown_tx,
            sampler: Some(sampler),
            perturber: Some(perturber),
        })
    }

    /// Receiver that flips to `true` once shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop both loops and wait for them to finish. Safe to call twice.
    pub async fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);

        for (name, handle) in [("sampler", self.sampler.take()), ("perturber", self.perturber.take())] {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!(task = name, error = %e, "Simulation task ended abnormally");
                }
            }
        }
        info!("Simulation scheduler stopped");
    }
}

impl Drop for SimulationScheduler {
    fn drop(&mut self) {
        // Loops that were never joined still stop promptly
        self.shutdown_tx.send_replace(true);
    }
}

/// One sampler tick. Returns how many channels received a new reading.
pub fn sample_voltages(store: &ChannelStore, rng: &SimRng) -> usize {
    store.with_channels(|channels| {
        let mut sampled = 0;
        for channel in channels.iter_mut().filter(|c| c.state.is_sampling()) {
            let (low, high) = channel.range.bounds();
            channel.record_sample(rng.gen_range(low..high));
            sampled += 1;
        }
        sampled
    })
}

/// One perturber tick. Returns the channels that changed state and how.
pub fn perturb_channels(
    store: &ChannelStore,
    rng: &SimRng,
    error_threshold: f64,
    busy_threshold: f64,
) -> Vec<(ChannelId, Perturbation)> {
    store.with_channels(|channels| {
        let mut changed = Vec::new();
        for (index, channel) in channels.iter_mut().enumerate() {
            if channel.state != ChannelState::Measuring {
                continue;
            }
            let perturbation = Perturbation::from_roll(rng.roll(), error_threshold, busy_threshold);
            let next = perturbation.apply(channel.state);
            if next != channel.state {
                channel.state = next;
                changed.push((ChannelId(index), perturbation));
            }
        }
        changed
    })
}

/// Spawn a deferred Busy recovery for one channel.
///
/// The task re-checks the channel under the lock when the delay elapses and is
/// a no-op unless the channel is still Busy. A shutdown signal received during
/// the delay cancels it without touching the store.
pub fn schedule_recovery(
    store: Arc<ChannelStore>,
    id: ChannelId,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = sleep(delay) => {
                match store.recover_if_busy(id) {
                    Ok(true) => info!(channel = %id, "Busy channel recovered to measuring"),
                    Ok(false) => debug!(channel = %id, "Channel left Busy before recovery; nothing to do"),
                    Err(e) => warn!(channel = %id, error = %e, "Recovery addressed a missing channel"),
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                debug!(channel = %id, "Recovery cancelled by shutdown");
            }
        }
    })
}

async fn run_sampler(
    store: Arc<ChannelStore>,
    rng: Arc<SimRng>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sampled = sample_voltages(&store, &rng);
                if sampled > 0 {
                    debug!(sampled, "Voltage sample tick");
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Voltage sampler stopped");
}

async fn run_perturber(
    store: Arc<ChannelStore>,
    rng: Arc<SimRng>,
    config: SimulationConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let units = rng.gen_range(config.perturb_interval_min..=config.perturb_interval_max);
        tokio::select! {
            _ = sleep(config.units(units)) => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        let changed = perturb_channels(
            &store,
            &rng,
            config.error_probability,
            config.busy_probability,
        );
        for (id, perturbation) in changed {
            match perturbation {
                Perturbation::Fault => warn!(channel = %id, "Channel faulted into error state"),
                Perturbation::Busy => {
                    info!(channel = %id, "Channel became busy");
                    schedule_recovery(store.clone(), id, config.recovery_delay(), shutdown.clone());
                }
                Perturbation::Stable => {}
            }
        }
    }
    debug!("State perturber stopped");
}

/// Resolves once shutdown is signalled or the scheduler is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
