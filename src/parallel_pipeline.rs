// THEORY:
// A single `OccupancyMonitor` assumes one driver thread. Sites with several cameras
// need one monitor per stream and a way to feed them side by side. The
// `MultiStreamMonitor` keeps a registry of monitors, each behind its own async mutex,
// so an `update` and a query or render on the same stream can never interleave and
// observe a half-updated grid.
//
// A batch of ticks is split per stream. Each stream's ticks run in batch order on
// their own tokio task; different streams run in parallel.

use crate::core_modules::dashboard::DashboardSnapshot;
use crate::core_modules::geometry::Observation;
use crate::core_modules::occupancy::Occupancy;
use crate::error::StreamError;
use crate::pipeline::{MonitorConfig, OccupancyMonitor, TickReport};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

type SharedMonitor = Arc<Mutex<OccupancyMonitor>>;

/// One frame's worth of observations for a named stream.
#[derive(Debug, Clone)]
pub struct StreamTick {
    pub stream: String,
    pub observations: Vec<Observation>,
    pub timestamp: f64,
}

impl StreamTick {
    pub fn new(stream: impl Into<String>, observations: Vec<Observation>, timestamp: f64) -> Self {
        Self {
            stream: stream.into(),
            observations,
            timestamp,
        }
    }
}

#[derive(Default)]
pub struct MultiStreamMonitor {
    streams: RwLock<HashMap<String, SharedMonitor>>,
}

impl MultiStreamMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_stream(&self, name: impl Into<String>, config: MonitorConfig) -> Result<(), StreamError> {
        let name = name.into();
        let mut streams = self.streams.write().await;
        if streams.contains_key(&name) {
            return Err(StreamError::DuplicateStream(name));
        }
        let monitor = OccupancyMonitor::new(config)?;
        info!(stream = %name, "stream registered");
        streams.insert(name, Arc::new(Mutex::new(monitor)));
        Ok(())
    }

    /// Drops a stream and all of its accumulated state.
    pub async fn remove_stream(&self, name: &str) -> bool {
        self.streams.write().await.remove(name).is_some()
    }

    pub async fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn stream(&self, name: &str) -> Result<SharedMonitor, StreamError> {
        self.streams
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StreamError::UnknownStream(name.to_string()))
    }

    pub async fn process_tick(&self, tick: StreamTick) -> Result<TickReport, StreamError> {
        let monitor = self.stream(&tick.stream).await?;
        let mut guard = monitor.lock().await;
        Ok(guard.update(&tick.observations, tick.timestamp))
    }

    /// Applies a batch of ticks. Results come back in batch order.
    pub async fn process_ticks(&self, ticks: Vec<StreamTick>) -> Vec<Result<TickReport, StreamError>> {
        let total = ticks.len();
        let mut groups: HashMap<String, Vec<(usize, StreamTick)>> = HashMap::new();
        for (index, tick) in ticks.into_iter().enumerate() {
            groups.entry(tick.stream.clone()).or_default().push((index, tick));
        }

        let mut results: Vec<Option<Result<TickReport, StreamError>>> = (0..total).map(|_| None).collect();
        let mut workers = Vec::new();
        let mut worker_streams = Vec::new();

        for (name, group) in groups {
            let monitor = match self.stream(&name).await {
                Ok(m) => m,
                Err(_) => {
                    for (index, _) in group {
                        results[index] = Some(Err(StreamError::UnknownStream(name.clone())));
                    }
                    continue;
                }
            };
            worker_streams.push((name, group.iter().map(|(i, _)| *i).collect::<Vec<_>>()));
            workers.push(tokio::spawn(async move {
                let mut guard = monitor.lock().await;
                group
                    .into_iter()
                    .map(|(index, tick)| (index, guard.update(&tick.observations, tick.timestamp)))
                    .collect::<Vec<_>>()
            }));
        }

        for (joined, (name, indices)) in join_all(workers).await.into_iter().zip(worker_streams) {
            match joined {
                Ok(reports) => {
                    for (index, report) in reports {
                        results[index] = Some(Ok(report));
                    }
                }
                Err(join_error) => {
                    error!(stream = %name, error = %join_error, "stream worker failed");
                    let reason = join_error.to_string();
                    for index in indices {
                        results[index] = Some(Err(StreamError::Worker {
                            stream: name.clone(),
                            reason: reason.clone(),
                        }));
                    }
                }
            }
        }

        // Every index was filled exactly once above.
        results.into_iter().flatten().collect()
    }

    pub async fn occupancy(&self, name: &str) -> Result<Occupancy, StreamError> {
        let monitor = self.stream(name).await?;
        let guard = monitor.lock().await;
        Ok(guard.occupancy())
    }

    /// Sums current occupancy and visitor counts over every stream.
    pub async fn combined_occupancy(&self) -> Occupancy {
        let monitors: Vec<SharedMonitor> = self.streams.read().await.values().cloned().collect();
        let mut total = Occupancy::default();
        for monitor in monitors {
            let occ = monitor.lock().await.occupancy();
            total.current_occupancy += occ.current_occupancy;
            total.total_visitors += occ.total_visitors;
        }
        total
    }

    pub async fn snapshot(&self, name: &str, now: f64) -> Result<DashboardSnapshot, StreamError> {
        let monitor = self.stream(name).await?;
        let mut guard = monitor.lock().await;
        Ok(guard.dashboard(now).clone())
    }

    /// Runs `f` with exclusive access to one stream's monitor, e.g. to render it.
    pub async fn with_stream<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut OccupancyMonitor) -> R,
    ) -> Result<R, StreamError> {
        let monitor = self.stream(name).await?;
        let mut guard = monitor.lock().await;
        Ok(f(&mut guard))
    }
}
