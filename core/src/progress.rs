use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// XP needed to advance one level. The level is always re-derived from XP
/// (`xp / XP_PER_LEVEL + 1`), never tracked independently.
pub const XP_PER_LEVEL: i64 = 100;
/// Flat XP for completing a task.
pub const XP_PER_TASK: i64 = 10;
/// Flat XP for a qualifying AI chat interaction.
pub const XP_PER_CHAT: i64 = 5;
/// XP per minute for duration-based completions (focus, pomodoro).
pub const XP_PER_FOCUS_MINUTE: i64 = 5;
/// Upper bound on a single completion's duration: one calendar day. Keeps
/// XP arithmetic far from i64 overflow and rejects obviously bogus input.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;
/// Bounded window of per-day aggregate entries. Older days are dropped,
/// not archived.
pub const DAILY_STATS_WINDOW: usize = 30;
/// Bounded length of the recent-completion history.
pub const HISTORY_WINDOW: usize = 20;

/// What kind of activity a completion records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Task,
    Focus,
    Pomodoro,
    Chat,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::Task => "task",
            CompletionKind::Focus => "focus",
            CompletionKind::Pomodoro => "pomodoro",
            CompletionKind::Chat => "chat",
        }
    }

    /// Default history title when the completion carries none.
    fn default_title(&self) -> &'static str {
        match self {
            CompletionKind::Task => "Task",
            CompletionKind::Focus => "Focus session",
            CompletionKind::Pomodoro => "Pomodoro session",
            CompletionKind::Chat => "AI chat",
        }
    }
}

impl FromStr for CompletionKind {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(CompletionKind::Task),
            "focus" => Ok(CompletionKind::Focus),
            "pomodoro" => Ok(CompletionKind::Pomodoro),
            "chat" => Ok(CompletionKind::Chat),
            other => Err(ProgressError::UnknownKind(other.to_string())),
        }
    }
}

/// One qualifying action, the unit of input for a single aggregation step.
/// Ephemeral — built by the request layer, never persisted in this form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompletionEvent {
    pub kind: CompletionKind,
    /// When the completion happened. Streaks and daily stats bucket by the
    /// UTC calendar date of this instant.
    pub timestamp: DateTime<Utc>,
    /// Minutes spent. Zero is valid (e.g. a checked-off task); negative or
    /// longer than [`MAX_DURATION_MINUTES`] is a validation error.
    pub duration_minutes: i64,
    /// Display title (task title, session label). Falls back per kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Per-day aggregate counters inside the bounded daily-stats window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub tasks_completed: i64,
    pub focus_time_minutes: i64,
}

/// A recent completion as shown in the user's activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub title: String,
    pub kind: CompletionKind,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// A user's full progress snapshot. Owned by the storage layer, mutated only
/// by [`apply_completion`] — which builds a new snapshot rather than editing
/// this one in place.
///
/// Invariants after every aggregation step:
/// - `level == xp / XP_PER_LEVEL + 1`
/// - `longest_streak >= current_streak`
/// - `daily_stats` is sorted newest-first with at most [`DAILY_STATS_WINDOW`]
///   entries, one per distinct day
/// - `history` is newest-first with at most [`HISTORY_WINDOW`] entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserProgress {
    pub xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    /// UTC calendar day of the most recent qualifying completion. Absent for
    /// a fresh user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_date: Option<NaiveDate>,
    pub daily_stats: Vec<DailyStat>,
    pub history: Vec<HistoryEntry>,
}

impl Default for UserProgress {
    /// The zero state: no XP, level 1, no streak, empty windows. Also what a
    /// reset writes back.
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            daily_stats: Vec::new(),
            history: Vec::new(),
        }
    }
}

/// Errors from the aggregation step. Validation only — the aggregator does no
/// I/O, so there is no partial-failure mode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("duration_minutes must not be negative, got {0}")]
    NegativeDuration(i64),
    #[error("duration_minutes must not exceed {MAX_DURATION_MINUTES} (one day), got {0}")]
    ExcessiveDuration(i64),
    #[error("unknown completion kind '{0}' (expected task, focus, pomodoro, or chat)")]
    UnknownKind(String),
}

/// Level derived from XP. Fresh users (0 XP) are level 1.
pub fn level_for_xp(xp: i64) -> i64 {
    xp / XP_PER_LEVEL + 1
}

/// XP awarded for one completion. Task and chat are flat; focus and pomodoro
/// scale with duration.
pub fn xp_for_event(kind: CompletionKind, duration_minutes: i64) -> i64 {
    match kind {
        CompletionKind::Task => XP_PER_TASK,
        CompletionKind::Chat => XP_PER_CHAT,
        CompletionKind::Focus | CompletionKind::Pomodoro => {
            duration_minutes * XP_PER_FOCUS_MINUTE
        }
    }
}

/// Apply one completion to a progress snapshot and return the new snapshot.
///
/// Pure: same inputs, same output, no I/O, input left untouched (safe to call
/// from concurrent request handlers; the storage layer is responsible for
/// serializing writes per user).
///
/// Streak rules compare UTC calendar days: first completion ever starts a
/// streak of 1, a repeat on the same day leaves it unchanged, the day after
/// the last activity extends it, and a gap of two or more days resets it to 1.
///
/// Timestamps are taken as reported. An event backdated to before the last
/// activity day is not special-cased: it falls under the gap rule, restarting
/// the streak at 1 and moving `last_activity_date` to the event's day.
/// Callers that need monotonic activity dates must reject backdated input
/// before calling this.
pub fn apply_completion(
    progress: &UserProgress,
    event: &CompletionEvent,
) -> Result<UserProgress, ProgressError> {
    if event.duration_minutes < 0 {
        return Err(ProgressError::NegativeDuration(event.duration_minutes));
    }
    if event.duration_minutes > MAX_DURATION_MINUTES {
        return Err(ProgressError::ExcessiveDuration(event.duration_minutes));
    }

    let today = event.timestamp.date_naive();

    let xp = progress.xp + xp_for_event(event.kind, event.duration_minutes);
    let level = level_for_xp(xp);

    let current_streak = match progress.last_activity_date {
        None => 1,
        Some(last) if last == today => progress.current_streak,
        Some(last) if last.succ_opt() == Some(today) => progress.current_streak + 1,
        Some(_) => 1,
    };
    let longest_streak = progress.longest_streak.max(current_streak);

    let mut daily_stats = progress.daily_stats.clone();
    let tasks_delta = i64::from(event.kind == CompletionKind::Task);
    match daily_stats.iter_mut().find(|s| s.date == today) {
        Some(stat) => {
            stat.tasks_completed += tasks_delta;
            stat.focus_time_minutes += event.duration_minutes;
        }
        None => daily_stats.push(DailyStat {
            date: today,
            tasks_completed: tasks_delta,
            focus_time_minutes: event.duration_minutes,
        }),
    }
    daily_stats.sort_by(|a, b| b.date.cmp(&a.date));
    daily_stats.truncate(DAILY_STATS_WINDOW);

    let mut history = Vec::with_capacity((progress.history.len() + 1).min(HISTORY_WINDOW));
    history.push(HistoryEntry {
        title: event
            .title
            .clone()
            .unwrap_or_else(|| event.kind.default_title().to_string()),
        kind: event.kind,
        completed_at: event.timestamp,
        duration_minutes: event.duration_minutes,
    });
    history.extend(progress.history.iter().cloned());
    history.truncate(HISTORY_WINDOW);

    Ok(UserProgress {
        xp,
        level,
        current_streak,
        longest_streak,
        last_activity_date: Some(today),
        daily_stats,
        history,
    })
}

/// Read-only projection over a snapshot: weekly/monthly sums plus the scalar
/// counters, the shape the dashboard consumes.
///
/// The weekly and monthly sums reduce over the first 7 / 30 entries of the
/// already-descending daily-stats window — windowed semantics, deliberately
/// not calendar-aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSummary {
    pub xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub weekly_focus_minutes: i64,
    pub weekly_tasks_completed: i64,
    pub monthly_focus_minutes: i64,
    pub monthly_tasks_completed: i64,
}

impl ProgressSummary {
    pub fn of(progress: &UserProgress) -> Self {
        let sum = |n: usize, f: fn(&DailyStat) -> i64| -> i64 {
            progress.daily_stats.iter().take(n).map(f).sum()
        };

        Self {
            xp: progress.xp,
            level: progress.level,
            current_streak: progress.current_streak,
            longest_streak: progress.longest_streak,
            weekly_focus_minutes: sum(7, |s| s.focus_time_minutes),
            weekly_tasks_completed: sum(7, |s| s.tasks_completed),
            monthly_focus_minutes: sum(30, |s| s.focus_time_minutes),
            monthly_tasks_completed: sum(30, |s| s.tasks_completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn task_on(day: u32) -> CompletionEvent {
        CompletionEvent {
            kind: CompletionKind::Task,
            timestamp: at(day),
            duration_minutes: 0,
            title: Some("Write report".to_string()),
        }
    }

    fn focus_on(day: u32, minutes: i64) -> CompletionEvent {
        CompletionEvent {
            kind: CompletionKind::Focus,
            timestamp: at(day),
            duration_minutes: minutes,
            title: None,
        }
    }

    #[test]
    fn first_task_from_zero_state() {
        let out = apply_completion(&UserProgress::default(), &task_on(1)).unwrap();

        assert_eq!(out.xp, 10);
        assert_eq!(out.level, 1);
        assert_eq!(out.current_streak, 1);
        assert_eq!(out.longest_streak, 1);
        assert_eq!(out.last_activity_date, Some(at(1).date_naive()));
        assert_eq!(
            out.daily_stats,
            vec![DailyStat {
                date: at(1).date_naive(),
                tasks_completed: 1,
                focus_time_minutes: 0,
            }]
        );
        assert_eq!(out.history.len(), 1);
        assert_eq!(out.history[0].title, "Write report");
    }

    #[test]
    fn next_day_extends_streak() {
        let p = apply_completion(&UserProgress::default(), &task_on(1)).unwrap();
        let p = apply_completion(&p, &task_on(2)).unwrap();

        assert_eq!(p.xp, 20);
        assert_eq!(p.current_streak, 2);
        assert_eq!(p.longest_streak, 2);
    }

    #[test]
    fn backdated_event_restarts_streak_at_its_day() {
        let p = apply_completion(&UserProgress::default(), &task_on(4)).unwrap();
        let p = apply_completion(&p, &task_on(5)).unwrap();
        let p = apply_completion(&p, &task_on(2)).unwrap();

        assert_eq!(p.current_streak, 1);
        assert_eq!(p.longest_streak, 2);
        assert_eq!(p.last_activity_date, Some(at(2).date_naive()));
        assert_eq!(p.xp, 30);
    }

    #[test]
    fn gap_resets_current_but_keeps_longest() {
        let p = apply_completion(&UserProgress::default(), &task_on(1)).unwrap();
        let p = apply_completion(&p, &task_on(2)).unwrap();
        let p = apply_completion(&p, &task_on(5)).unwrap();

        assert_eq!(p.current_streak, 1);
        assert_eq!(p.longest_streak, 2);
    }

    #[test]
    fn same_day_repeat_does_not_double_count_streak() {
        let p = apply_completion(&UserProgress::default(), &task_on(1)).unwrap();
        let p = apply_completion(&p, &task_on(2)).unwrap();
        let again = apply_completion(&p, &task_on(2)).unwrap();

        assert_eq!(again.current_streak, p.current_streak);
        assert_eq!(again.last_activity_date, Some(at(2).date_naive()));
        // XP still accrues on same-day repeats
        assert_eq!(again.xp, p.xp + XP_PER_TASK);
    }

    #[test]
    fn input_snapshot_is_not_mutated() {
        let p = apply_completion(&UserProgress::default(), &task_on(1)).unwrap();
        let before = p.clone();
        let _ = apply_completion(&p, &focus_on(2, 25)).unwrap();
        assert_eq!(p, before);
    }

    #[test]
    fn focus_xp_scales_with_duration_and_crosses_levels() {
        let p = apply_completion(&UserProgress::default(), &focus_on(1, 50)).unwrap();

        assert_eq!(p.xp, 250);
        assert_eq!(p.level, 3);
        assert_eq!(p.daily_stats[0].focus_time_minutes, 50);
        assert_eq!(p.daily_stats[0].tasks_completed, 0);
        assert_eq!(p.history[0].title, "Focus session");
    }

    #[test]
    fn zero_duration_focus_is_valid_and_awards_no_xp() {
        let p = apply_completion(&UserProgress::default(), &focus_on(1, 0)).unwrap();
        assert_eq!(p.xp, 0);
        assert_eq!(p.level, 1);
        assert_eq!(p.current_streak, 1);
    }

    #[test]
    fn chat_awards_flat_xp_regardless_of_duration() {
        let event = CompletionEvent {
            kind: CompletionKind::Chat,
            timestamp: at(1),
            duration_minutes: 90,
            title: None,
        };
        let p = apply_completion(&UserProgress::default(), &event).unwrap();
        assert_eq!(p.xp, XP_PER_CHAT);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = apply_completion(&UserProgress::default(), &focus_on(1, -5)).unwrap_err();
        assert_eq!(err, ProgressError::NegativeDuration(-5));
    }

    #[test]
    fn over_one_day_duration_is_rejected() {
        let err = apply_completion(
            &UserProgress::default(),
            &focus_on(1, MAX_DURATION_MINUTES + 1),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::ExcessiveDuration(MAX_DURATION_MINUTES + 1));

        // Exactly one day is still valid
        let p = apply_completion(&UserProgress::default(), &focus_on(1, MAX_DURATION_MINUTES))
            .unwrap();
        assert_eq!(p.xp, MAX_DURATION_MINUTES * XP_PER_FOCUS_MINUTE);
    }

    #[test]
    fn absurd_duration_cannot_overflow_xp() {
        // A near-i64::MAX duration must surface as a validation error, never
        // reach the XP multiply and wrap or panic.
        let err =
            apply_completion(&UserProgress::default(), &focus_on(1, i64::MAX / 2)).unwrap_err();
        assert_eq!(err, ProgressError::ExcessiveDuration(i64::MAX / 2));
    }

    #[test]
    fn same_day_events_merge_into_one_daily_stat() {
        let p = apply_completion(&UserProgress::default(), &task_on(1)).unwrap();
        let p = apply_completion(&p, &focus_on(1, 30)).unwrap();
        let p = apply_completion(&p, &task_on(1)).unwrap();

        assert_eq!(p.daily_stats.len(), 1);
        assert_eq!(p.daily_stats[0].tasks_completed, 2);
        assert_eq!(p.daily_stats[0].focus_time_minutes, 30);
    }

    #[test]
    fn daily_stats_window_keeps_the_most_recent_thirty_days() {
        let mut p = UserProgress::default();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        for i in 0..40 {
            let event = CompletionEvent {
                kind: CompletionKind::Task,
                timestamp: start + Duration::days(i),
                duration_minutes: 0,
                title: None,
            };
            p = apply_completion(&p, &event).unwrap();
        }

        assert_eq!(p.daily_stats.len(), DAILY_STATS_WINDOW);
        // Newest first, and the oldest surviving day is exactly 29 days back.
        assert_eq!(p.daily_stats[0].date, (start + Duration::days(39)).date_naive());
        assert_eq!(
            p.daily_stats.last().unwrap().date,
            (start + Duration::days(10)).date_naive()
        );
        // 40 consecutive days, never broken
        assert_eq!(p.current_streak, 40);
        assert_eq!(p.longest_streak, 40);
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let mut p = UserProgress::default();
        for i in 0..(HISTORY_WINDOW + 5) {
            let event = CompletionEvent {
                kind: CompletionKind::Task,
                timestamp: at(1) + Duration::minutes(i as i64),
                duration_minutes: 0,
                title: Some(format!("task {i}")),
            };
            p = apply_completion(&p, &event).unwrap();
        }

        assert_eq!(p.history.len(), HISTORY_WINDOW);
        assert_eq!(p.history[0].title, format!("task {}", HISTORY_WINDOW + 4));
    }

    #[test]
    fn xp_and_longest_streak_never_decrease() {
        let events = [
            task_on(1),
            focus_on(1, 0),
            task_on(2),
            task_on(5),
            focus_on(6, 120),
            task_on(20),
        ];

        let mut p = UserProgress::default();
        for event in &events {
            let next = apply_completion(&p, event).unwrap();
            assert!(next.xp >= p.xp);
            assert!(next.longest_streak >= p.longest_streak);
            assert!(next.longest_streak >= next.current_streak);
            assert_eq!(next.level, level_for_xp(next.xp));
            p = next;
        }
    }

    #[test]
    fn summary_sums_windowed_slices() {
        let mut p = UserProgress::default();
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        for i in 0..10 {
            let event = CompletionEvent {
                kind: CompletionKind::Focus,
                timestamp: start + Duration::days(i),
                duration_minutes: 10,
                title: None,
            };
            p = apply_completion(&p, &event).unwrap();
            p = apply_completion(
                &p,
                &CompletionEvent {
                    kind: CompletionKind::Task,
                    timestamp: start + Duration::days(i),
                    duration_minutes: 0,
                    title: None,
                },
            )
            .unwrap();
        }

        let summary = ProgressSummary::of(&p);
        // 7 most recent days, not the calendar week
        assert_eq!(summary.weekly_focus_minutes, 70);
        assert_eq!(summary.weekly_tasks_completed, 7);
        assert_eq!(summary.monthly_focus_minutes, 100);
        assert_eq!(summary.monthly_tasks_completed, 10);
        assert_eq!(summary.current_streak, 10);
    }

    #[test]
    fn summary_of_zero_state_is_all_zero_except_level() {
        let summary = ProgressSummary::of(&UserProgress::default());
        assert_eq!(summary.xp, 0);
        assert_eq!(summary.level, 1);
        assert_eq!(summary.weekly_focus_minutes, 0);
        assert_eq!(summary.monthly_tasks_completed, 0);
    }

    #[test]
    fn kind_parses_from_wire_strings() {
        assert_eq!("task".parse::<CompletionKind>().unwrap(), CompletionKind::Task);
        assert_eq!("focus".parse::<CompletionKind>().unwrap(), CompletionKind::Focus);
        assert!(matches!(
            "sprint".parse::<CompletionKind>(),
            Err(ProgressError::UnknownKind(_))
        ));
    }
}
