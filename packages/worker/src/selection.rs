use chrono::NaiveTime;
use cierge_platform::Slot;
use cierge_types::parse_wall_time;

use crate::error::WorkerError;

pub fn parse_preferred_times(raw: &[String]) -> Result<Vec<NaiveTime>, WorkerError> {
    if raw.is_empty() {
        return Err(WorkerError::InvalidEvent("no preferred times".to_string()));
    }
    raw.iter()
        .map(|t| parse_wall_time(t).map_err(|e| WorkerError::InvalidEvent(e.to_string())))
        .collect()
}

/// Keep slots whose wall-clock time equals a preferred time, ordered by
/// preference rather than by the platform's ordering.
pub fn select_preferred(slots: &[Slot], preferred: &[NaiveTime]) -> Vec<Slot> {
    let mut selected: Vec<Slot> = Vec::new();
    for time in preferred {
        for slot in slots.iter().filter(|s| s.time() == *time) {
            if !selected.iter().any(|s| s.config_token == slot.config_token) {
                selected.push(slot.clone());
            }
        }
    }
    selected
}
