//! Task plan derivation from recommended tasks.

use chrono::{DateTime, Days, Utc};

use crate::core::types::{PlannedTask, Priority, Quadrant, RecommendedTask};

pub fn quadrant_for(priority: Priority) -> Quadrant {
    match priority {
        Priority::UrgentImportant => Quadrant::HighImpHighUrg,
        Priority::ImportantNotUrgent => Quadrant::HighImpLowUrg,
        Priority::UrgentNotImportant => Quadrant::LowImpHighUrg,
        Priority::NeitherUrgentNorImportant => Quadrant::LowImpLowUrg,
    }
}

/// Map recommended tasks onto quadrants with due dates counted from `created_at`.
pub fn plan_tasks(tasks: &[RecommendedTask], created_at: DateTime<Utc>) -> Vec<PlannedTask> {
    let start = created_at.date_naive();
    tasks
        .iter()
        .map(|task| PlannedTask {
            title: task.title.clone(),
            description: task.description.clone(),
            quadrant: quadrant_for(task.priority),
            due_date: start
                .checked_add_days(Days::new(u64::from(task.suggested_due_days)))
                .unwrap_or(start),
        })
        .collect()
}
