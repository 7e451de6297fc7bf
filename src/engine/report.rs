// src/engine/report.rs

use crate::types::ModuleId;

/// How one module fared within its level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
    pub module: ModuleId,
    /// Logical attempts, including the successful one.
    pub attempts: u32,
    pub worker_losses: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelReport {
    pub index: usize,
    /// Sorted by module id.
    pub modules: Vec<ModuleReport>,
}

/// Summary of a run in which every level was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: u64,
    pub stack: String,
    pub levels: Vec<LevelReport>,
    /// The last level was an unordered cycle remainder.
    pub cycle_fallback: bool,
}

impl RunReport {
    /// Every applied module, in level order.
    pub fn applied_modules(&self) -> Vec<ModuleId> {
        self.levels
            .iter()
            .flat_map(|l| l.modules.iter().map(|m| m.module.clone()))
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.levels.iter().map(|l| l.modules.len()).sum()
    }

    /// Total retries across the run (logical attempts beyond the first).
    pub fn retries(&self) -> u32 {
        self.levels
            .iter()
            .flat_map(|l| &l.modules)
            .map(|m| m.attempts.saturating_sub(1))
            .sum()
    }
}
