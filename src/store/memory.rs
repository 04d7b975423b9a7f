//! In-memory circuit state store.
//!
//! All state sits behind one async mutex, so every trait method is a single
//! atomic step. Suitable for single-node deployments and tests; several
//! breaker engines can share one instance to behave like gateway instances
//! sharing one external store.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::breaker::types::{
    CircuitInfo, CircuitState, QueueResponseType, UpdateStatisticsResult, WindowSettings,
};
use crate::routing::matcher::{CircuitId, RulePattern};
use crate::store::{CircuitStateStore, StoreError, StoreResult};

/// Ordering key of a window entry: timestamp, then insertion sequence.
type EntryKey = (u64, u64);

/// Sliding window of outcomes for one circuit.
#[derive(Debug, Default)]
struct StatisticsWindow {
    entries: BTreeMap<EntryKey, (String, QueueResponseType)>,
    by_request: HashMap<String, EntryKey>,
    failures: u64,
    seq: u64,
}

impl StatisticsWindow {
    fn record(&mut self, request_id: &str, timestamp: u64, outcome: QueueResponseType) {
        if let Some(key) = self.by_request.remove(request_id) {
            self.remove_entry(key);
        }
        self.seq += 1;
        let key = (timestamp, self.seq);
        self.entries.insert(key, (request_id.to_string(), outcome));
        self.by_request.insert(request_id.to_string(), key);
        if outcome == QueueResponseType::Failure {
            self.failures += 1;
        }
    }

    /// Drop entries older than `now - max_age`, then the oldest beyond `max_entries`.
    fn evict(&mut self, now: u64, max_age: u64, max_entries: u64) {
        let min_ts = now.saturating_sub(max_age);
        while let Some((&key, _)) = self.entries.first_key_value() {
            if key.0 >= min_ts {
                break;
            }
            self.remove_indexed(key);
        }
        while self.entries.len() as u64 > max_entries {
            match self.entries.first_key_value() {
                Some((&key, _)) => self.remove_indexed(key),
                None => break,
            }
        }
    }

    fn remove_indexed(&mut self, key: EntryKey) {
        if let Some((request_id, _)) = self.entries.get(&key) {
            let request_id = request_id.clone();
            self.by_request.remove(&request_id);
        }
        self.remove_entry(key);
    }

    fn remove_entry(&mut self, key: EntryKey) {
        if let Some((_, QueueResponseType::Failure)) = self.entries.remove(&key) {
            self.failures -= 1;
        }
    }

    fn total(&self) -> u64 {
        self.entries.len() as u64
    }

    fn fail_ratio(&self) -> u32 {
        match self.total() {
            0 => 0,
            total => (self.failures * 100 / total) as u32,
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_request.clear();
        self.failures = 0;
    }
}

#[derive(Debug, Default)]
struct CircuitRecord {
    info: CircuitInfo,
    window: StatisticsWindow,
}

#[derive(Debug, Default)]
struct StoreState {
    /// All circuits index with per-circuit info and statistics.
    circuits: HashMap<CircuitId, CircuitRecord>,
    /// Locked queues per circuit with their lock timestamp.
    locked: HashMap<CircuitId, HashMap<String, u64>>,
    open: BTreeSet<CircuitId>,
    half_open: BTreeSet<CircuitId>,
    unlock_fifo: VecDeque<String>,
}

impl StoreState {
    fn state_of(&self, circuit: &CircuitId) -> CircuitState {
        self.circuits
            .get(circuit)
            .map(|c| c.info.state)
            .unwrap_or_default()
    }

    fn set_state(&mut self, circuit: &CircuitId, state: CircuitState) {
        if let Some(record) = self.circuits.get_mut(circuit) {
            record.info.state = state;
        }
        self.open.remove(circuit);
        self.half_open.remove(circuit);
        match state {
            CircuitState::Open => {
                self.open.insert(circuit.clone());
            }
            CircuitState::HalfOpen => {
                self.half_open.insert(circuit.clone());
            }
            CircuitState::Closed => {}
        }
    }

    fn push_unlock(&mut self, queue: String) {
        if !self.unlock_fifo.contains(&queue) {
            self.unlock_fifo.push_back(queue);
        }
    }

    fn close(&mut self, circuit: &CircuitId) {
        if let Some(record) = self.circuits.get_mut(circuit) {
            record.window.clear();
            record.info.fail_ratio = 0;
        }
        self.set_state(circuit, CircuitState::Closed);

        if let Some(queues) = self.locked.remove(circuit) {
            let mut ordered: Vec<(String, u64)> = queues.into_iter().collect();
            ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            for (queue, _) in ordered {
                self.push_unlock(queue);
            }
        }
    }
}

/// Single-process implementation of [`CircuitStateStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCircuitStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queues waiting in the unlock FIFO.
    pub async fn pending_unlocks(&self) -> usize {
        self.state.lock().await.unlock_fifo.len()
    }
}

#[async_trait]
impl CircuitStateStore for MemoryCircuitStore {
    async fn get_state(&self, circuit: &CircuitId) -> StoreResult<CircuitState> {
        Ok(self.state.lock().await.state_of(circuit))
    }

    async fn get_info(&self, circuit: &CircuitId) -> StoreResult<Option<CircuitInfo>> {
        let state = self.state.lock().await;
        Ok(state.circuits.get(circuit).map(|c| c.info.clone()))
    }

    async fn get_all_circuits(&self) -> StoreResult<BTreeMap<CircuitId, CircuitInfo>> {
        let state = self.state.lock().await;
        Ok(state
            .circuits
            .iter()
            .map(|(id, record)| (id.clone(), record.info.clone()))
            .collect())
    }

    async fn locked_queues(&self, circuit: &CircuitId) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut queues: Vec<(&String, &u64)> = state
            .locked
            .get(circuit)
            .map(|q| q.iter().collect())
            .unwrap_or_default();
        queues.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        Ok(queues.into_iter().map(|(q, _)| q.clone()).collect())
    }

    async fn update_statistics(
        &self,
        circuit: &RulePattern,
        request_id: &str,
        timestamp: u64,
        settings: &WindowSettings,
        outcome: QueueResponseType,
    ) -> StoreResult<UpdateStatisticsResult> {
        let mut state = self.state.lock().await;
        let id = circuit.circuit_id();

        let record = state.circuits.entry(id.clone()).or_default();
        record.info.pattern = Some(circuit.pattern().to_string());
        record.info.metric_name = circuit.metric_name().map(str::to_string);

        record.window.record(request_id, timestamp, outcome);
        record.window.evict(
            timestamp,
            settings.entries_max_age_ms,
            settings.max_queue_sample_count,
        );
        let total = record.window.total();
        let ratio = record.window.fail_ratio();
        record.info.fail_ratio = ratio;
        let current = record.info.state;

        let threshold_reached = total >= settings.min_queue_sample_count
            && ratio >= settings.error_threshold_percentage;
        if threshold_reached && current != CircuitState::Open {
            state.set_state(id, CircuitState::Open);
            return Ok(UpdateStatisticsResult::Opened);
        }
        Ok(UpdateStatisticsResult::NoChange)
    }

    async fn lock_queue(
        &self,
        queue: &str,
        circuit: &CircuitId,
        timestamp: u64,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.state_of(circuit) {
            CircuitState::Open | CircuitState::HalfOpen => {
                state
                    .locked
                    .entry(circuit.clone())
                    .or_default()
                    .insert(queue.to_string(), timestamp);
                Ok(true)
            }
            CircuitState::Closed => {
                state.push_unlock(queue.to_string());
                Ok(false)
            }
        }
    }

    async fn close_circuit(&self, circuit: &CircuitId) -> StoreResult<()> {
        self.state.lock().await.close(circuit);
        Ok(())
    }

    async fn close_and_remove_circuit(&self, circuit: &CircuitId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.close(circuit);
        state.circuits.remove(circuit);
        Ok(())
    }

    async fn close_all_circuits(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let ids: BTreeSet<CircuitId> = state
            .circuits
            .keys()
            .chain(state.locked.keys())
            .cloned()
            .collect();
        for id in &ids {
            state.close(id);
        }
        Ok(())
    }

    async fn re_open_circuit(&self, circuit: &CircuitId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        match state.state_of(circuit) {
            CircuitState::HalfOpen => {
                state.set_state(circuit, CircuitState::Open);
                Ok(())
            }
            CircuitState::Open => Ok(()),
            other => Err(StoreError::IllegalTransition {
                circuit: circuit.clone(),
                state: other,
            }),
        }
    }

    async fn set_open_circuits_to_half_open(&self) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let open: Vec<CircuitId> = state.open.iter().cloned().collect();
        for id in &open {
            state.set_state(id, CircuitState::HalfOpen);
        }
        Ok(open.len() as u64)
    }

    async fn unlock_sample_queues(&self, timestamp: u64) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let half_open: Vec<CircuitId> = state.half_open.iter().cloned().collect();
        let mut samples = Vec::new();

        for id in &half_open {
            let oldest = state.locked.get_mut(id).and_then(|queues| {
                let oldest = queues
                    .iter()
                    .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                    .map(|(q, _)| q.clone())?;
                queues.insert(oldest.clone(), timestamp);
                Some(oldest)
            });
            if let Some(queue) = oldest {
                state.push_unlock(queue.clone());
                samples.push(queue);
            }
        }
        Ok(samples)
    }

    async fn pop_queue_to_unlock(&self) -> StoreResult<Option<String>> {
        Ok(self.state.lock().await.unlock_fifo.pop_front())
    }

    async fn push_queue_to_unlock(&self, queue: &str) -> StoreResult<()> {
        self.state.lock().await.push_unlock(queue.to_string());
        Ok(())
    }
}
