//! System health scoring shown on the admin dashboard.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::backup::STATUS_COMPLETED;

/// Raw counts the score is computed from.
#[derive(Debug, Clone, Default)]
pub struct HealthInputs {
    pub occupied_workstations: i64,
    pub total_workstations: i64,
    pub active_sessions: i64,
    pub total_files: i64,
    /// Status of the most recent backup, if any exists.
    pub last_backup_status: Option<String>,
}

/// Per-metric scores, each in 0..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthScores {
    pub cpu: u8,
    pub memory: u8,
    pub storage: u8,
    pub network: u8,
    pub backup: u8,
    pub overall: u8,
    /// `healthy`, `degraded` or `critical`.
    pub status: String,
}

fn clamp_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

pub fn compute(inputs: &HealthInputs) -> HealthScores {
    let cpu = if inputs.total_workstations > 0 {
        clamp_score(
            inputs.occupied_workstations as f64 / inputs.total_workstations as f64 * 100.0,
        )
    } else {
        0
    };

    let memory = clamp_score(100.0 - inputs.active_sessions as f64 * 5.0);
    let storage = clamp_score(100.0 - inputs.total_files as f64 * 0.5);

    let network = if inputs.active_sessions == 0 {
        100
    } else {
        clamp_score((100.0 - inputs.active_sessions as f64 * 3.0).clamp(50.0, 100.0))
    };

    let backup = match inputs.last_backup_status.as_deref() {
        Some(STATUS_COMPLETED) => 100,
        Some(_) => 50,
        None => 0,
    };

    let sum: u32 = [cpu, memory, storage, network, backup]
        .iter()
        .map(|&v| u32::from(v))
        .sum();
    let overall = clamp_score(f64::from(sum) / 5.0);

    HealthScores {
        cpu,
        memory,
        storage,
        network,
        backup,
        overall,
        status: status_label(overall).to_string(),
    }
}

pub fn status_label(overall: u8) -> &'static str {
    match overall {
        80..=100 => "healthy",
        50..=79 => "degraded",
        _ => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_cafe_with_completed_backup() {
        let scores = compute(&HealthInputs {
            occupied_workstations: 0,
            total_workstations: 10,
            active_sessions: 0,
            total_files: 0,
            last_backup_status: Some("completed".to_string()),
        });
        assert_eq!(scores.cpu, 0);
        assert_eq!(scores.memory, 100);
        assert_eq!(scores.storage, 100);
        assert_eq!(scores.network, 100);
        assert_eq!(scores.backup, 100);
        assert_eq!(scores.overall, 80);
        assert_eq!(scores.status, "healthy");
    }

    #[test]
    fn busy_cafe_scores() {
        let scores = compute(&HealthInputs {
            occupied_workstations: 3,
            total_workstations: 4,
            active_sessions: 4,
            total_files: 41,
            last_backup_status: Some("failed".to_string()),
        });
        assert_eq!(scores.cpu, 75);
        assert_eq!(scores.memory, 80);
        // 100 - 20.5 rounds half away from zero.
        assert_eq!(scores.storage, 80);
        assert_eq!(scores.network, 88);
        assert_eq!(scores.backup, 50);
        assert_eq!(scores.overall, 75);
        assert_eq!(scores.status, "degraded");
    }

    #[test]
    fn scores_are_clamped() {
        let scores = compute(&HealthInputs {
            occupied_workstations: 0,
            total_workstations: 0,
            active_sessions: 40,
            total_files: 1000,
            last_backup_status: None,
        });
        assert_eq!(scores.cpu, 0);
        assert_eq!(scores.memory, 0);
        assert_eq!(scores.storage, 0);
        assert_eq!(scores.network, 50);
        assert_eq!(scores.backup, 0);
        assert_eq!(scores.overall, 10);
        assert_eq!(scores.status, "critical");
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(status_label(100), "healthy");
        assert_eq!(status_label(80), "healthy");
        assert_eq!(status_label(79), "degraded");
        assert_eq!(status_label(50), "degraded");
        assert_eq!(status_label(49), "critical");
    }
}
