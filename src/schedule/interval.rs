use chrono::NaiveTime;

/// One weekly occurrence: a wall-clock window on a given day of week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyWindow {
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WeeklyWindow {
    pub fn new(day_of_week: u8, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            day_of_week,
            start,
            end,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.day_of_week <= 6 && self.start < self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Whether `candidate` collides with `existing`.
///
/// Windows are half-open, so back-to-back lessons (`candidate.start == existing.end`
/// or `candidate.end == existing.start`) never collide.
pub fn conflicts(candidate: &WeeklyWindow, existing: &WeeklyWindow) -> bool {
    if candidate.day_of_week != existing.day_of_week {
        return false;
    }
    let starts_inside = candidate.start >= existing.start && candidate.start < existing.end;
    let ends_inside = candidate.end > existing.start && candidate.end <= existing.end;
    let contains = candidate.start <= existing.start && candidate.end >= existing.end;
    starts_inside || ends_inside || contains
}
