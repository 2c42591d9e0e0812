use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

use super::error::{SchedError, SchedResult};
use super::model::{weekday_index, HybridPattern, WeekKind};

pub fn classify_week(pattern: &HybridPattern, week_number: u32) -> WeekKind {
    if pattern.group_weeks.contains(&week_number) {
        WeekKind::Group
    } else if pattern.individual_weeks.contains(&week_number) {
        WeekKind::Individual
    } else {
        WeekKind::Unscheduled
    }
}

/// Concrete date of `day_of_week` (0 = Sunday) in week `week_number` of a term.
///
/// Week `n` is anchored at `term_start + 7*(n-1)` days; the result is the day with
/// the requested weekday inside the same Sunday-to-Saturday week as that anchor,
/// so it can land before the anchor when the term starts midweek.
pub fn date_for_week(term_start: NaiveDate, week_number: u32, day_of_week: u8) -> NaiveDate {
    let anchor = term_start + Duration::days(7 * (i64::from(week_number.max(1)) - 1));
    let shift = i64::from(day_of_week) - i64::from(weekday_index(anchor));
    anchor + Duration::days(shift)
}

/// Week sets for an ALTERNATING pattern: every other week is individual,
/// beginning with `first_individual_week`.
pub fn alternating_weeks(total_weeks: u32, first_individual_week: u32) -> (BTreeSet<u32>, BTreeSet<u32>) {
    let mut group = BTreeSet::new();
    let mut individual = BTreeSet::new();
    for w in 1..=total_weeks {
        if w >= first_individual_week && (w - first_individual_week) % 2 == 0 {
            individual.insert(w);
        } else {
            group.insert(w);
        }
    }
    (group, individual)
}

pub fn validate_week_sets(
    group_weeks: &BTreeSet<u32>,
    individual_weeks: &BTreeSet<u32>,
    total_weeks: u32,
) -> SchedResult<()> {
    if let Some(w) = group_weeks.intersection(individual_weeks).next() {
        return Err(SchedError::BadParams(format!(
            "week {} is listed as both a group and an individual week",
            w
        )));
    }
    for &w in group_weeks.iter().chain(individual_weeks.iter()) {
        if w < 1 || w > total_weeks {
            return Err(SchedError::BadParams(format!(
                "week {} is outside the term (1..={})",
                w, total_weeks
            )));
        }
    }
    Ok(())
}
