//! Application orchestration.
//!
//! Connects the venue, starts one worker per configured instrument with
//! its poll and reconcile timers and its venue-callback forwarder, and
//! shuts them down together.

use std::collections::HashMap;

use chrono::Utc;
use pf_core::SignalGenerator;
use pf_position::DynVenue;
use pf_telemetry::{worker_span, Metrics};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::status::{new_status_board, StatusBoard};
use crate::worker::{
    spawn_forwarder, spawn_ticker, InstrumentWorker, WorkerMsg, WORKER_QUEUE_CAPACITY,
};

/// Main application.
pub struct Application {
    config: AppConfig,
    venue: DynVenue,
    generators: HashMap<String, Box<dyn SignalGenerator>>,
    status: StatusBoard,
}

impl Application {
    /// Every configured instrument needs a signal generator.
    pub fn new(
        config: AppConfig,
        venue: DynVenue,
        generators: HashMap<String, Box<dyn SignalGenerator>>,
    ) -> AppResult<Self> {
        config.validate()?;
        if let Some(missing) = config
            .instruments
            .iter()
            .find(|symbol| !generators.contains_key(*symbol))
        {
            return Err(AppError::Config(format!(
                "no signal generator for instrument {missing}"
            )));
        }

        Ok(Self {
            config,
            venue,
            generators,
            status: new_status_board(),
        })
    }

    pub fn status_board(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Connect, recover every worker and start them.
    ///
    /// A worker that cannot recover its state fails the whole start; no
    /// instrument trades on a half-restored account.
    pub async fn start(mut self) -> AppResult<RunningApp> {
        let timeout = self.config.runtime.venue_timeout();
        match tokio::time::timeout(timeout, self.venue.connect()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::Config(format!(
                    "venue connect timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
        Metrics::venue_connected(true);
        info!(instruments = ?self.config.instruments, mode = %self.config.risk.mode, "Venue connected");

        let book = self.config.instrument_book();
        let runtime = self.config.runtime.clone();
        let mut workers = Vec::with_capacity(self.config.instruments.len());

        for symbol in self.config.instruments.clone() {
            let spec = book.get(&symbol)?.clone();
            let generator = self
                .generators
                .remove(&symbol)
                .ok_or_else(|| AppError::Config(format!("no signal generator for {symbol}")))?;

            let mut worker = InstrumentWorker::new(
                &self.config,
                spec,
                self.venue.clone(),
                generator,
                self.status.clone(),
                Utc::now(),
            )?;

            // Subscribe before recovery so fills during the startup
            // reconcile are not lost.
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            self.venue.subscribe(&symbol, event_tx).await?;
            worker.startup(Utc::now()).await?;

            let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
            let tasks = vec![
                spawn_forwarder(event_rx, tx.clone()),
                spawn_ticker(tx.clone(), runtime.poll_interval(), WorkerMsg::PollBars, false),
                spawn_ticker(tx.clone(), runtime.reconcile_interval(), WorkerMsg::Reconcile, true),
            ];
            let join = tokio::spawn(worker.run(rx).instrument(worker_span(&symbol)));
            info!(instrument = %symbol, "Worker started");

            workers.push(WorkerHandle {
                instrument: symbol,
                tx,
                join,
                tasks,
            });
        }

        Ok(RunningApp {
            venue: self.venue,
            workers,
            status: self.status,
        })
    }

    /// Run until Ctrl-C, then shut down gracefully.
    pub async fn run(self) -> AppResult<()> {
        let running = self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        running.shutdown().await
    }
}

struct WorkerHandle {
    instrument: String,
    tx: mpsc::Sender<WorkerMsg>,
    join: JoinHandle<AppResult<()>>,
    /// Timers and the callback forwarder.
    tasks: Vec<JoinHandle<()>>,
}

/// Handle to a started application.
pub struct RunningApp {
    venue: DynVenue,
    workers: Vec<WorkerHandle>,
    status: StatusBoard,
}

impl RunningApp {
    pub fn status_board(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Queue of one instrument's worker, for manual polls or reconciles.
    pub fn sender(&self, instrument: &str) -> Option<mpsc::Sender<WorkerMsg>> {
        self.workers
            .iter()
            .find(|w| w.instrument == instrument)
            .map(|w| w.tx.clone())
    }

    /// Stop the timers, flatten through each worker, then disconnect.
    ///
    /// Returns the first worker error; every worker is still awaited.
    pub async fn shutdown(self) -> AppResult<()> {
        let mut forwarders = Vec::new();
        let mut pending = Vec::new();
        for worker in self.workers {
            let mut tasks = worker.tasks.into_iter();
            // Forwarder first; it must keep running until the flatten fill.
            if let Some(forwarder) = tasks.next() {
                forwarders.push(forwarder);
            }
            for timer in tasks {
                timer.abort();
            }
            if worker.tx.send(WorkerMsg::Shutdown).await.is_err() {
                warn!(instrument = %worker.instrument, "Worker already stopped");
            }
            pending.push((worker.instrument, worker.join));
        }

        let mut first_error = None;
        for (instrument, join) in pending {
            let err = match join.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => {
                    error!(instrument = %instrument, error = %e, "Worker task failed");
                    Some(AppError::WorkerStopped(instrument.clone()))
                }
            };
            if let Some(e) = err {
                error!(instrument = %instrument, error = %e, "Worker shutdown error");
                first_error.get_or_insert(e);
            }
        }

        for forwarder in forwarders {
            forwarder.abort();
        }
        let timeout = std::time::Duration::from_secs(5);
        match tokio::time::timeout(timeout, self.venue.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Venue disconnect failed"),
            Err(_) => warn!("Venue disconnect timed out"),
        }
        Metrics::venue_connected(false);
        info!("Shutdown complete");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
