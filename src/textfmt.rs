//! The six-integer task-set text format: `C T D S P1 P2` per task, one task
//! per line, blank line separating task sets. Grounded on
//! `crpd/fileio.py::SetupInputFile`.
//!
//! This module is a pure in-memory string codec — no file I/O. Reading from
//! or writing to disk is left to the caller.

use crate::error::ParseError;
use crate::scheduler::{DualPriorityPolicy, DualPriorityTaskInfo};
use crate::task::{ArrivalDistribution, Task, TaskSet, Time};

/// Parses one whitespace-separated `C T D S P1 P2` line into a task plus
/// its Dual-Priority scheduling info. `T` and `D` must match (only
/// implicit-deadline tasks are representable in this format); `P1 >= P2`
/// is required, with `P1 == P2` meaning no promotion (single priority
/// band) — matches `SetupInputFile._buildTask`.
fn parse_line(line_no: usize, line: &str) -> Result<(Task, DualPriorityTaskInfo), ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(ParseError::MalformedLine {
            line: line_no,
            text: line.to_string(),
        });
    }
    let mut values = [0i64; 6];
    for (i, f) in fields.iter().enumerate() {
        values[i] = f.parse::<i64>().map_err(|_| ParseError::MalformedLine {
            line: line_no,
            text: line.to_string(),
        })?;
    }
    let [c, t, d, s, p1, p2] = values;

    if t != d {
        return Err(ParseError::InvalidTaskSet {
            line: line_no,
            message: format!("period {t} and deadline {d} must be equal (implicit-deadline format)"),
        });
    }
    if p1 < p2 {
        return Err(ParseError::InvalidTaskSet {
            line: line_no,
            message: format!("low priority {p1} must be at least as urgent a number as high priority {p2}... got p1 < p2"),
        });
    }

    let task = Task::new(c, d, ArrivalDistribution::fixed(t));
    let info = if p1 == p2 {
        DualPriorityTaskInfo::without_promotion(p1)
    } else {
        DualPriorityTaskInfo::with_promotion(p1, s as Time, p2)
    };
    Ok((task, info))
}

/// Parses every task of one task set starting at `lines[start]`, stopping
/// at the first blank line or the first line that doesn't parse as a task.
/// Returns the tasks consumed and the index of the line after the last one
/// consumed.
fn parse_one_set(lines: &[&str], start: usize) -> (Vec<(Task, DualPriorityTaskInfo)>, usize) {
    let mut tasks = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            break;
        }
        match parse_line(i + 1, line) {
            Ok(pair) => {
                tasks.push(pair);
                i += 1;
            }
            Err(_) => break,
        }
    }
    (tasks, i)
}

/// Parses a single task set from the start of `input`. Returns
/// [`ParseError::Empty`] if no task lines are found before a blank line or
/// end of input.
pub fn parse_task_set(input: &str) -> Result<(TaskSet, DualPriorityPolicy), ParseError> {
    let lines: Vec<&str> = input.lines().collect();
    let (pairs, _) = parse_one_set(&lines, 0);
    if pairs.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(build_task_set(pairs))
}

/// Parses every task set in `input`, in order, each separated by a blank
/// line. Stops collecting a given set as soon as a line fails to parse —
/// matching `SetupInputFile._genSetups`'s behavior of silently truncating
/// at the first unrecognized line rather than raising.
pub fn parse_all_task_sets(input: &str) -> Vec<(TaskSet, DualPriorityPolicy)> {
    let lines: Vec<&str> = input.lines().collect();
    let mut sets = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }
        let (pairs, next) = parse_one_set(&lines, i);
        if pairs.is_empty() {
            break;
        }
        sets.push(build_task_set(pairs));
        i = next;
    }
    sets
}

fn build_task_set(pairs: Vec<(Task, DualPriorityTaskInfo)>) -> (TaskSet, DualPriorityPolicy) {
    let policy = DualPriorityPolicy::new(pairs.iter().map(|(t, info)| (t.unique_id(), *info)));
    let task_set = TaskSet::new(pairs.into_iter().map(|(t, _)| t).collect());
    (task_set, policy)
}

/// Formats one task and its Dual-Priority info back into a `C T D S P1 P2`
/// line. `S` (the promotion offset) is written as `0` for a task with no
/// promotion, matching the convention that a single-band task's promotion
/// field is unused.
pub fn format_task(task: &Task, info: &DualPriorityTaskInfo) -> String {
    let c = task.wcet();
    let t = task.minimal_inter_arrival_time();
    let d = task.deadline();
    let (s, p1, p2) = match (info.promotion(), info.high_priority()) {
        (Some(promo), Some(high)) => (promo, info.low_priority(), high),
        _ => (0, info.low_priority(), info.low_priority()),
    };
    format!("{c} {t} {d} {s} {p1} {p2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::reset_task_id_counter;

    #[test]
    fn parses_a_single_task_set() {
        reset_task_id_counter();
        let input = "4 10 10 0 1 1\n2 20 20 0 2 2\n";
        let (task_set, policy) = parse_task_set(input).unwrap();
        assert_eq!(task_set.len(), 2);
        assert_eq!(policy.tasks().count(), 2);
    }

    #[test]
    fn blank_line_separates_multiple_sets() {
        reset_task_id_counter();
        let input = "4 10 10 0 1 1\n\n2 20 20 0 1 1\n3 30 30 0 2 2\n";
        let sets = parse_all_task_sets(input);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].0.len(), 1);
        assert_eq!(sets[1].0.len(), 2);
    }

    #[test]
    fn promoted_task_parses_dual_priority_band() {
        reset_task_id_counter();
        let input = "4 10 10 3 5 1\n";
        let (task_set, policy) = parse_task_set(input).unwrap();
        let task = &task_set.tasks()[0];
        assert!(policy.has_promotion(task.unique_id()));
        assert_eq!(policy.promotion(task.unique_id()), Some(3));
    }

    #[test]
    fn mismatched_period_and_deadline_is_rejected() {
        let err = parse_line(1, "4 10 12 0 1 1");
        assert!(matches!(err, Err(ParseError::InvalidTaskSet { .. })));
    }

    #[test]
    fn unrecognized_line_stops_parsing_without_error() {
        reset_task_id_counter();
        let input = "4 10 10 0 1 1\nnot a task line\n2 20 20 0 1 1\n";
        let sets = parse_all_task_sets(input);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].0.len(), 1);
    }

    #[test]
    fn round_trips_through_format_task() {
        reset_task_id_counter();
        let input = "4 10 10 3 5 1\n";
        let (task_set, policy) = parse_task_set(input).unwrap();
        let task = &task_set.tasks()[0];
        let info = policy.scheduler_info(task.unique_id());
        let formatted = format_task(task, info);
        assert_eq!(formatted, "4 10 10 3 5 1");
    }
}
