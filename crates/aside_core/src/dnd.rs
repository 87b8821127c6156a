//! The Do Not Disturb gate.
//!
//! Written only by the control surface, read by the monitor at the top
//! of every tick. A flip mid-tick takes effect on the next tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// How many state transitions are kept for the introspection surface.
const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct DndTransition {
    pub enabled: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct GateLog {
    last_update: Option<DateTime<Utc>>,
    history: VecDeque<DndTransition>,
}

/// Process-wide DND flag plus a bounded transition log.
#[derive(Debug, Default)]
pub struct DndGate {
    enabled: AtomicBool,
    log: Mutex<GateLog>,
}

impl DndGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the gate and record the transition.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        let now = Utc::now();
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.last_update = Some(now);
        log.history.push_back(DndTransition { enabled, at: now });
        while log.history.len() > HISTORY_CAP {
            log.history.pop_front();
        }
        tracing::info!(enabled, "do-not-disturb state updated");
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).last_update
    }

    /// Most recent `n` transitions, newest last.
    pub fn recent_transitions(&self, n: usize) -> Vec<DndTransition> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.history.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn transition_count(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).history.len()
    }
}
