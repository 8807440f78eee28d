use super::*;

fn options(version_interval: i64, seconds_interval: i64) -> ArchiveOptions {
    ArchiveOptions {
        version_interval,
        seconds_interval,
        ..ArchiveOptions::default()
    }
}

fn brief(index: i32, start: i64, end: i64, start_ts: i64, end_ts: i64) -> ArchiveBrief {
    ArchiveBrief {
        id: format!("a{index}"),
        start_version: start,
        end_version: end,
        start_timestamp: start_ts,
        end_timestamp: end_ts,
        index,
        event_is_cleared: false,
    }
}

fn accumulate_range(state: &mut ArchiveState, from: i64, to: i64) {
    for v in from..=to {
        state.accumulate(&EventBase::new(v, v * 10));
    }
}

#[test]
fn test_accumulate_opens_then_extends() {
    let mut state = ArchiveState::default();
    state.accumulate(&EventBase::new(1, 100));
    state.accumulate(&EventBase::new(2, 250));

    let pending = state.pending().unwrap();
    assert_eq!(pending.index, 0);
    assert_eq!(pending.start_version, 1);
    assert_eq!(pending.end_version, 2);
    assert_eq!(pending.start_timestamp, 100);
    assert_eq!(pending.end_timestamp, 250);
}

#[test]
fn test_completion_by_version_span() {
    let opts = options(2, 86_400);
    let mut state = ArchiveState::default();
    accumulate_range(&mut state, 1, 2);
    assert!(!state.pending_is_completed(&opts));
    accumulate_range(&mut state, 3, 3);
    assert!(state.pending_is_completed(&opts));
}

#[test]
fn test_completion_by_elapsed_time() {
    let opts = options(1_000, 1);
    let mut state = ArchiveState::default();
    state.accumulate(&EventBase::new(1, 0));
    state.accumulate(&EventBase::new(2, 1_000));
    assert!(!state.pending_is_completed(&opts));
    state.accumulate(&EventBase::new(3, 1_001));
    assert!(state.pending_is_completed(&opts));
}

#[test]
fn test_completion_measured_from_previous_window() {
    let opts = options(2, 86_400);
    let previous = brief(0, 1, 3, 10, 30);
    let current = brief(1, 4, 5, 40, 50);
    assert!(!current.is_completed(&opts, Some(&previous)));
    let current = brief(1, 4, 6, 40, 60);
    assert!(current.is_completed(&opts, Some(&previous)));
}

#[test]
fn test_promote_assigns_next_index() {
    let opts = options(2, 86_400);
    let mut state = ArchiveState::default();
    accumulate_range(&mut state, 1, 3);
    assert!(state.pending_is_completed(&opts));
    state.promote_pending();
    assert!(state.pending().is_none());

    accumulate_range(&mut state, 4, 4);
    assert_eq!(state.pending().unwrap().index, 1);
    assert_eq!(state.last().unwrap().end_version, 3);
}

#[test]
fn test_from_briefs_sorts_and_resumes_incomplete_last() {
    let opts = options(2, 86_400);
    let briefs = vec![brief(1, 4, 5, 40, 50), brief(0, 1, 3, 10, 30)];

    let (state, resumed) = ArchiveState::from_briefs(briefs, &opts);

    let resumed = resumed.unwrap();
    assert_eq!(resumed.index, 1);
    assert_eq!(state.pending(), Some(&resumed));
    assert_eq!(state.briefs().len(), 1);
    assert_eq!(state.last().unwrap().index, 0);
}

#[test]
fn test_from_briefs_keeps_completed_last() {
    let opts = options(2, 86_400);
    let briefs = vec![brief(0, 1, 3, 10, 30), brief(1, 4, 6, 40, 60)];

    let (state, resumed) = ArchiveState::from_briefs(briefs, &opts);

    assert!(resumed.is_none());
    assert!(state.pending().is_none());
    assert_eq!(state.briefs().len(), 2);
    assert!(state.is_contiguous());
}

#[test]
fn test_from_briefs_never_resumes_cleared_window() {
    let opts = options(100, 86_400);
    let mut only = brief(0, 1, 3, 10, 30);
    only.event_is_cleared = true;

    let (state, resumed) = ArchiveState::from_briefs(vec![only], &opts);

    assert!(resumed.is_none());
    assert_eq!(state.cleared().unwrap().index, 0);
}

#[test]
fn test_fold_suffix_into_pending() {
    let mut state = ArchiveState::default();
    state.briefs = vec![
        brief(0, 1, 3, 10, 30),
        brief(1, 4, 6, 40, 60),
        brief(2, 7, 9, 70, 90),
    ];
    state.accumulate(&EventBase::new(10, 100));

    // Lands inside window 1: windows 1 and 2 fold into the pending one.
    let folded = state.fold_overlapping(45);

    assert_eq!(folded.len(), 2);
    assert_eq!(state.briefs().len(), 1);
    let pending = state.pending().unwrap();
    assert_eq!(pending.index, 1);
    assert_eq!(pending.start_version, 4);
    assert_eq!(pending.end_version, 10);
    assert_eq!(pending.start_timestamp, 40);
    assert_eq!(pending.end_timestamp, 100);
}

#[test]
fn test_fold_at_exact_window_end_is_noop() {
    let mut state = ArchiveState::default();
    state.briefs = vec![brief(0, 1, 3, 10, 30)];

    assert!(state.fold_overlapping(30).is_empty());
    assert_eq!(state.briefs().len(), 1);
    assert!(state.pending().is_none());
}

#[test]
fn test_fold_older_than_every_window() {
    let mut state = ArchiveState::default();
    state.briefs = vec![brief(0, 1, 3, 10, 30), brief(1, 4, 6, 40, 60)];

    let folded = state.fold_overlapping(1);

    assert_eq!(folded.len(), 2);
    assert!(state.briefs().is_empty());
    let pending = state.pending().unwrap();
    assert_eq!(pending.index, 0);
    assert_eq!((pending.start_version, pending.end_version), (1, 6));
}

#[test]
fn test_fold_skips_cleared_prefix() {
    let mut state = ArchiveState::default();
    let mut cleared = brief(0, 1, 3, 10, 30);
    cleared.event_is_cleared = true;
    state.briefs = vec![cleared, brief(1, 4, 6, 40, 60)];

    let folded = state.fold_overlapping(5);

    assert_eq!(folded.len(), 1);
    assert_eq!(folded[0].index, 1);
    assert_eq!(state.briefs().len(), 1);
    assert!(state.briefs()[0].event_is_cleared);
}

#[test]
fn test_collapse_keeps_single_cleared() {
    let mut state = ArchiveState::default();
    state.briefs = vec![
        brief(0, 1, 3, 10, 30),
        brief(1, 4, 6, 40, 60),
        brief(2, 7, 9, 70, 90),
    ];
    state.mark_cleared("a0");
    state.mark_cleared("a1");

    let removed = state.collapse_cleared();

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, "a0");
    assert_eq!(state.cleared().unwrap().id, "a1");
    assert_eq!(state.uncleared().count(), 1);
    assert!(state.is_contiguous());
}

#[test]
fn test_catch_up_window() {
    let mut state = ArchiveState::default();
    assert!(!state.needs_catch_up(0));
    assert!(state.needs_catch_up(5));
    assert_eq!(state.catch_up_from(), 0);

    state.briefs = vec![brief(0, 1, 3, 10, 30)];
    assert!(state.needs_catch_up(5));
    assert!(!state.needs_catch_up(3));
    assert_eq!(state.catch_up_from(), 3);

    state.accumulate(&EventBase::new(4, 40));
    assert_eq!(state.catch_up_from(), 4);
    assert!(!state.needs_catch_up(4));
}
