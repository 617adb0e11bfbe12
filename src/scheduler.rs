//! Interval scheduler running chains with `cron` contexts

use crate::chain::{Chain, InstanceMiddleware};
use crate::context::{cron_context, Context};
use crate::error::{ModulinkError, Result};
use crate::metrics::{ChainMetrics, ExecutionTimer};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Clone)]
struct Job {
    every: Duration,
    chain: Chain,
    middleware: Vec<InstanceMiddleware>,
}

impl Job {
    async fn run(&self, name: &str, metrics: &Arc<ChainMetrics>) -> Context {
        let mut ctx = cron_context(name, &schedule_label(self.every));
        ctx.instance_middleware = self.middleware.clone();

        let timer = ExecutionTimer::new(metrics.clone());
        let result = self.chain.execute(ctx).await;
        timer.finish(&result);

        match &result.error {
            Some(error) => warn!("Scheduled job '{}' failed: {}", name, error.message),
            None => debug!("Scheduled job '{}' completed", name),
        }
        result
    }
}

pub struct Scheduler {
    jobs: DashMap<String, Job>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<ChainMetrics>,
}

impl Scheduler {
    pub fn new(metrics: Arc<ChainMetrics>) -> Self {
        Self {
            jobs: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Run `chain` every `every`, first tick one period from now
    pub fn schedule(&self, job_name: &str, every: Duration, chain: Chain) {
        self.schedule_with(job_name, every, chain, Vec::new());
    }

    pub fn schedule_with(
        &self,
        job_name: &str,
        every: Duration,
        chain: Chain,
        middleware: Vec<InstanceMiddleware>,
    ) {
        let job = Job {
            every,
            chain,
            middleware,
        };
        self.jobs.insert(job_name.to_string(), job.clone());

        let name = job_name.to_string();
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                job.run(&name, &metrics).await;
            }
        });
        self.tasks.lock().push(handle);

        info!("Scheduled '{}' {}", job_name, schedule_label(every));
    }

    /// Run a scheduled job immediately, outside its interval
    pub async fn trigger(&self, job_name: &str) -> Result<Context> {
        let job = self
            .jobs
            .get(job_name)
            .map(|j| j.value().clone())
            .ok_or_else(|| ModulinkError::ChainNotFound(job_name.to_string()))?;
        Ok(job.run(job_name, &self.metrics).await)
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.iter().map(|j| j.key().clone()).collect();
        names.sort();
        names
    }

    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        info!("Stopping {} scheduled job(s)", tasks.len());
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

fn schedule_label(every: Duration) -> String {
    format!("every {}s", every.as_secs_f64())
}
