//! Script load / crash-recovery rotation.
//!
//! ```text
//!            ┌──────────────── failure: index = (index + 1) % N ───────┐
//!            ▼                                                         │
//!   SelectCandidate ──▶ Loading (top-level code, then OnStart()) ──────┤
//!     pinned? use it once                                              │
//!     else candidates[index]        success: index = 0 ──▶ Running     │
//!                                                                      │
//!   budget (N + pinned) spent ◀────────────────────────────────────────┘
//!            │
//!            ▼
//!   AwaitingCommand (no script; control surface still reachable)
//! ```
//!
//! A pinned path is consumed by the attempt that uses it, whether the
//! attempt succeeds or not, and a failed pinned attempt advances the
//! rotation like any other failure.

use core::fmt;

use heapless::Vec;
use log::{info, warn};

use crate::config::{MAX_LOAD_CANDIDATES, ScriptPath};

/// How a load cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `path` loaded and its `OnStart()` returned normally.
    Running { path: String, attempts: u32 },
    /// Every candidate failed once; the runtime idles until commanded.
    Abandoned { attempts: u32 },
}

/// Ordered candidate list plus the rotation cursor.
#[derive(Debug, Clone)]
pub struct LoadRecovery {
    candidates: Vec<ScriptPath, MAX_LOAD_CANDIDATES>,
    rotation_index: usize,
}

impl LoadRecovery {
    /// `candidates` must be non-empty (enforced by config validation).
    pub fn new(candidates: Vec<ScriptPath, MAX_LOAD_CANDIDATES>) -> Self {
        Self {
            candidates,
            rotation_index: 0,
        }
    }

    pub fn rotation_index(&self) -> usize {
        self.rotation_index
    }

    pub fn candidates(&self) -> &[ScriptPath] {
        &self.candidates
    }

    /// Attempts allowed in one cycle: one full rotation, plus the pinned try.
    pub fn attempt_budget(&self, pinned: bool) -> u32 {
        self.candidates.len() as u32 + u32::from(pinned)
    }

    fn advance(&mut self) {
        if !self.candidates.is_empty() {
            self.rotation_index = (self.rotation_index + 1) % self.candidates.len();
        }
    }

    /// Run one load cycle.
    ///
    /// `attempt` is called with each selected path and must execute the
    /// script's top-level code and its startup entrypoint on a fresh engine.
    pub fn run<F, E>(&mut self, pinned: Option<String>, mut attempt: F) -> LoadOutcome
    where
        F: FnMut(&str) -> Result<(), E>,
        E: fmt::Display,
    {
        let budget = self.attempt_budget(pinned.is_some());
        let mut pinned = pinned;
        let mut attempts = 0;

        while attempts < budget {
            attempts += 1;
            let path = match pinned.take() {
                Some(p) => p,
                None => match self.candidates.get(self.rotation_index) {
                    Some(p) => p.as_str().to_owned(),
                    None => break,
                },
            };

            info!("Loading {} (attempt {}/{})", path, attempts, budget);
            match attempt(&path) {
                Ok(()) => {
                    self.rotation_index = 0;
                    return LoadOutcome::Running { path, attempts };
                }
                Err(e) => {
                    warn!("Load of {} failed: {}", path, e);
                    self.advance();
                }
            }
        }

        LoadOutcome::Abandoned { attempts }
    }
}
