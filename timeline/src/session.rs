//! Session driver: runs a built timeline trial by trial.
//!
//! The driver is the only writer of trial records. Each finished trial is
//! recorded with its provenance *before* the root advances, so a `while`
//! chunk evaluating its predicate during that advance already sees it.
//!
//! Callback order for one trial: `on_data_update`, the trial's own
//! `on_finish`, `on_trial_finish`, then either `on_trial_start` for the next
//! trial or the session-level `on_finish`.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::chunk::Timeline;
use crate::core::identity::ChunkId;
use crate::core::progress::{ProgressReport, progress};
use crate::core::types::{TrialParams, TrialSpec};
use crate::data::{DEFAULT_RECORD_KEYS, InMemoryDataStore, TrialRecord};
use crate::error::{Result, SchedulerError};

pub const DEFAULT_MAX_TRIALS: usize = 10_000;

type TrialCallback = Box<dyn FnMut(&TrialSpec) + Send>;
type RecordCallback = Box<dyn FnMut(&TrialRecord) + Send>;
type FinishCallback = Box<dyn FnMut(&[TrialRecord]) + Send>;

/// Session-level callbacks. All are optional.
#[derive(Default)]
pub struct SessionHooks {
    on_trial_start: Option<TrialCallback>,
    on_trial_finish: Option<RecordCallback>,
    on_data_update: Option<RecordCallback>,
    on_finish: Option<FinishCallback>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_trial_start(mut self, hook: impl FnMut(&TrialSpec) + Send + 'static) -> Self {
        self.on_trial_start = Some(Box::new(hook));
        self
    }

    pub fn on_trial_finish(mut self, hook: impl FnMut(&TrialRecord) + Send + 'static) -> Self {
        self.on_trial_finish = Some(Box::new(hook));
        self
    }

    pub fn on_data_update(mut self, hook: impl FnMut(&TrialRecord) + Send + 'static) -> Self {
        self.on_data_update = Some(Box::new(hook));
        self
    }

    /// Called once with every record when the timeline completes.
    pub fn on_finish(mut self, hook: impl FnMut(&[TrialRecord]) + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_trial_start", &self.on_trial_start.is_some())
            .field("on_trial_finish", &self.on_trial_finish.is_some())
            .field("on_data_update", &self.on_data_update.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// What the driver wants next.
#[derive(Debug, Clone)]
pub enum SessionStep {
    /// Run this trial, then call [`Session::finish_trial`].
    Trial(TrialSpec),
    Finished,
}

/// Runs one trial on behalf of [`Session::run`].
pub trait TrialExecutor {
    /// Execute `trial` and return the values its plugin produced.
    fn execute(&mut self, trial: &TrialSpec, chunk_id: &ChunkId) -> anyhow::Result<TrialParams>;
}

impl<F> TrialExecutor for F
where
    F: FnMut(&TrialSpec, &ChunkId) -> anyhow::Result<TrialParams>,
{
    fn execute(&mut self, trial: &TrialSpec, chunk_id: &ChunkId) -> anyhow::Result<TrialParams> {
        self(trial, chunk_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub trials_run: usize,
}

#[derive(Debug)]
pub struct Session {
    timeline: Timeline,
    store: InMemoryDataStore,
    hooks: SessionHooks,
    max_trials: usize,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    current: Option<TrialSpec>,
}

impl Session {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            store: InMemoryDataStore::new(),
            hooks: SessionHooks::default(),
            max_trials: DEFAULT_MAX_TRIALS,
            started_at: None,
            finished_at: None,
            current: None,
        }
    }

    pub fn with_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Upper bound on delivered trials; guards against `while` chunks that never stop.
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Start the clock and deliver the first trial.
    ///
    /// A session starts once; a second call fails with `AlreadyStarted` and
    /// leaves the clock and the trial in flight untouched.
    pub fn start(&mut self) -> Result<SessionStep> {
        if self.started_at.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        self.started_at = Some(Instant::now());
        info!(
            trials = self.timeline.length(),
            chunks = self.timeline.root().children().len(),
            "session started"
        );
        self.next_step()
    }

    /// Trial delivered and not yet finished.
    pub fn current_trial(&self) -> Option<&TrialSpec> {
        self.current.as_ref()
    }

    /// Record the outcome of the current trial and move on.
    ///
    /// `values` are the plugin's results. Object-valued user `data` is merged
    /// over them; any other `data` value is stored under `data`. The default
    /// record keys are always set by the driver.
    pub fn finish_trial(&mut self, values: TrialParams) -> Result<SessionStep> {
        let trial = self.current.take().ok_or(SchedulerError::NoTrialInProgress)?;
        let record = self.build_record(&trial, values);

        self.store.write(record.clone());
        if let Some(hook) = self.hooks.on_data_update.as_mut() {
            hook(&record);
        }
        if let Some(hook) = &trial.on_finish {
            hook.call(&record);
        }
        if let Some(hook) = self.hooks.on_trial_finish.as_mut() {
            hook(&record);
        }

        self.timeline.advance(&self.store);
        self.next_step()
    }

    /// Drive the whole session, asking `executor` to run each trial.
    #[instrument(skip_all, fields(max_trials = self.max_trials))]
    pub fn run(&mut self, executor: &mut dyn TrialExecutor) -> anyhow::Result<SessionOutcome> {
        let mut step = self.start()?;
        while let SessionStep::Trial(trial) = step {
            let chunk_id = self.timeline.active_chunk_id();
            let values = executor
                .execute(&trial, &chunk_id)
                .with_context(|| format!("trial '{}' in chunk {} failed", trial.plugin, chunk_id))?;
            step = self.finish_trial(values)?;
        }
        Ok(SessionOutcome {
            trials_run: self.store.len(),
        })
    }

    pub fn progress(&self) -> ProgressReport {
        progress(&self.timeline)
    }

    /// Deepest chunk active right now.
    pub fn current_chunk_id(&self) -> ChunkId {
        self.timeline.active_chunk_id()
    }

    pub fn data(&self) -> &InMemoryDataStore {
        &self.store
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.started_at
    }

    /// Time since `start`, frozen once the session finishes.
    pub fn total_time(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    fn next_step(&mut self) -> Result<SessionStep> {
        if self.timeline.is_complete(&self.store) {
            self.finished_at = Some(Instant::now());
            info!(
                trials = self.store.len(),
                elapsed_ms = self.total_time().as_millis() as u64,
                "session finished"
            );
            if let Some(hook) = self.hooks.on_finish.as_mut() {
                hook(self.store.records());
            }
            return Ok(SessionStep::Finished);
        }

        if self.timeline.root().trials_total() >= self.max_trials {
            return Err(SchedulerError::TrialLimitExceeded {
                max_trials: self.max_trials,
            });
        }

        let trial = self.timeline.next(&self.store)?.clone();
        debug!(
            plugin = %trial.plugin,
            chunk_id = %self.timeline.active_chunk_id(),
            global = self.timeline.root().trials_total(),
            "trial delivered"
        );
        if let Some(hook) = self.hooks.on_trial_start.as_mut() {
            hook(&trial);
        }
        self.current = Some(trial.clone());
        Ok(SessionStep::Trial(trial))
    }

    fn build_record(&self, trial: &TrialSpec, mut values: TrialParams) -> TrialRecord {
        match &trial.data {
            Some(Value::Object(data)) => {
                for (key, value) in data {
                    values.insert(key.clone(), value.clone());
                }
            }
            Some(data) => {
                values.insert("data".to_string(), data.clone());
            }
            None => {}
        }
        for key in DEFAULT_RECORD_KEYS {
            values.remove(key);
        }

        let elapsed = self
            .started_at
            .map_or(Duration::ZERO, |start| start.elapsed());
        TrialRecord {
            trial_type: trial.plugin.clone(),
            trial_index: self.timeline.current_trial_local_index(),
            trial_index_global: self.timeline.root().trials_total(),
            time_elapsed: elapsed.as_millis() as u64,
            internal_chunk_id: self.timeline.active_chunk_id().to_string(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::core::factory::ChunkFactory;
    use crate::definition::{ChunkDefinition, ExperimentDefinition, TrialDefinition};
    use crate::test_support::{echo_registry, trials};
    use serde_json::json;

    fn session(entries: Vec<crate::definition::Entry>) -> Session {
        let registry = echo_registry(&["a", "b"]);
        let timeline = ChunkFactory::new(&registry)
            .build(&ExperimentDefinition::new(entries))
            .expect("build");
        Session::new(timeline)
    }

    fn values(pairs: &[(&str, Value)]) -> TrialParams {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn records_carry_default_fields() {
        let mut session = session(vec![
            trials("a", 2),
            ChunkDefinition::linear(vec![trials("b", 1)]).into(),
        ]);
        assert!(matches!(session.start().expect("start"), SessionStep::Trial(_)));
        session
            .finish_trial(values(&[("rt", json!(350))]))
            .expect("finish a-0");
        session.finish_trial(TrialParams::new()).expect("finish a-1");
        let step = session.finish_trial(TrialParams::new()).expect("finish b-0");
        assert!(matches!(step, SessionStep::Finished));

        let records = session.data().records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].trial_type, "a");
        assert_eq!(records[0].trial_index, Some(0));
        assert_eq!(records[1].trial_index, Some(1));
        assert_eq!(records[0].get("rt"), Some(&json!(350)));
        assert_eq!(records[2].trial_index_global, 2);
        assert_eq!(records[0].internal_chunk_id, "0-0");
        assert_eq!(records[2].internal_chunk_id, "0-0.1-0");
        assert!(session.is_finished());
    }

    #[test]
    fn user_data_is_merged_and_cannot_override_defaults() {
        let registry = echo_registry(&["a"]);
        let definition = ExperimentDefinition::new(vec![
            TrialDefinition::new("a")
                .param("stimuli", json!(["x", "y"]))
                .data(json!([{"phase": "test", "trial_type": "spoof"}, "plain"]))
                .into(),
        ]);
        let timeline = ChunkFactory::new(&registry)
            .build(&definition)
            .expect("build");
        let mut session = Session::new(timeline);
        session.start().expect("start");
        session
            .finish_trial(values(&[("phase", json!("plugin"))]))
            .expect("first");
        session.finish_trial(TrialParams::new()).expect("second");

        let records = session.data().records();
        assert_eq!(records[0].get("phase"), Some(&json!("test")));
        assert_eq!(records[0].trial_type, "a");
        assert!(records[0].get("trial_type").is_none());
        assert_eq!(records[1].get("data"), Some(&json!("plain")));
    }

    #[test]
    fn finish_without_current_trial_is_an_error() {
        let mut session = session(vec![trials("a", 1)]);
        let err = session
            .finish_trial(TrialParams::new())
            .expect_err("not started");
        assert!(matches!(err, SchedulerError::NoTrialInProgress));
    }

    #[test]
    fn second_start_keeps_the_running_session() {
        let mut session = session(vec![trials("a", 2)]);
        session.start().expect("start");
        let started_at = session.start_time();

        let err = session.start().expect_err("already started");
        assert!(matches!(err, SchedulerError::AlreadyStarted));
        assert_eq!(session.start_time(), started_at);
        assert_eq!(
            session.current_trial().map(|trial| trial.plugin.as_str()),
            Some("a")
        );

        session.finish_trial(TrialParams::new()).expect("first");
        assert_eq!(session.data().len(), 1);
    }

    #[test]
    fn hooks_fire_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let push = |label: &'static str| {
            let log = Arc::clone(&log);
            move || log.lock().expect("lock").push(label)
        };
        let (start, data, finish, done) = (
            push("start"),
            push("data"),
            push("trial_finish"),
            push("finish"),
        );
        let trial_hook = push("on_finish");

        let registry = echo_registry(&["a"]);
        let definition = ExperimentDefinition::new(vec![
            TrialDefinition::new("a")
                .param("stimuli", json!(["x"]))
                .on_finish(move |_| trial_hook())
                .into(),
        ]);
        let timeline = ChunkFactory::new(&registry)
            .build(&definition)
            .expect("build");
        let hooks = SessionHooks::new()
            .on_trial_start(move |_| start())
            .on_data_update(move |_| data())
            .on_trial_finish(move |_| finish())
            .on_finish(move |_| done());
        let mut session = Session::new(timeline).with_hooks(hooks);

        session.start().expect("start");
        session.finish_trial(TrialParams::new()).expect("finish");
        assert_eq!(
            *log.lock().expect("lock"),
            vec!["start", "data", "on_finish", "trial_finish", "finish"]
        );
    }

    #[test]
    fn run_stops_at_max_trials() {
        let mut session = session(vec![
            ChunkDefinition::repeat_while(vec![trials("a", 1)], |_| true).into(),
        ])
        .with_max_trials(5);
        let mut executor =
            |_: &TrialSpec, _: &ChunkId| -> anyhow::Result<TrialParams> { Ok(TrialParams::new()) };
        let err = session.run(&mut executor).expect_err("bounded");
        assert!(matches!(
            err.downcast_ref::<SchedulerError>(),
            Some(SchedulerError::TrialLimitExceeded { max_trials: 5 })
        ));
        assert_eq!(session.data().len(), 5);
    }

    #[test]
    fn run_reports_executor_failures_with_context() {
        let mut session = session(vec![trials("a", 2)]);
        let mut executor = |trial: &TrialSpec, _: &ChunkId| -> anyhow::Result<TrialParams> {
            anyhow::ensure!(trial.param("stimulus") != Some(&json!("a-1")), "device lost");
            Ok(TrialParams::new())
        };
        let err = session.run(&mut executor).expect_err("executor failure");
        let message = format!("{err:#}");
        assert!(message.contains("trial 'a' in chunk 0-0 failed"));
        assert!(message.contains("device lost"));
        assert_eq!(session.data().len(), 1);
    }

    #[test]
    fn total_time_freezes_after_finish() {
        let mut session = session(vec![trials("a", 1)]);
        assert_eq!(session.total_time(), Duration::ZERO);
        session.start().expect("start");
        assert!(session.start_time().is_some());
        session.finish_trial(TrialParams::new()).expect("finish");
        let first = session.total_time();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(session.total_time(), first);
    }
}
