use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{domain::UserId, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Lesson {
    pub starts_at: DateTime<Utc>,
    pub discipline: String,
    pub instructor: String,
    pub location: String,
    pub description: String,
}

#[async_trait]
pub trait ScheduleService: Send + Sync {
    /// Today's lessons for the user, earliest first.
    async fn today(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<Lesson>>;
}

/// Demo timetable: the same two lessons later today for everyone.
#[derive(Default)]
pub struct InMemoryScheduleService;

impl InMemoryScheduleService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScheduleService for InMemoryScheduleService {
    async fn today(&self, _user_id: UserId, now: DateTime<Utc>) -> Result<Vec<Lesson>> {
        Ok(vec![
            Lesson {
                starts_at: now + Duration::hours(2),
                discipline: "Calculus".to_string(),
                instructor: "Assoc. Prof. Svetlana Ivanova".to_string(),
                location: "Building A, room 302".to_string(),
                description: "Lecture. Bring a notebook and a calculator.".to_string(),
            },
            Lesson {
                starts_at: now + Duration::hours(5),
                discipline: "Programming".to_string(),
                instructor: "Prof. Alexey Petrov".to_string(),
                location: "Building B, room 115".to_string(),
                description: "Lab session. Prepare questions on async tasks.".to_string(),
            },
        ])
    }
}
