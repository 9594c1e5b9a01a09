use crate::model::*;

// ── Free-window derivation ───────────────────────────────────────

/// Open time for a provider inside the query window: the window minus the
/// merged holds. Free time is never materialized; it is always derived here.
pub fn free_windows_in(
    slots: &ProviderSlots,
    query: &TimeRange,
    min_duration: Option<Ms>,
) -> Vec<TimeRange> {
    let mut held: Vec<TimeRange> = slots
        .overlapping(query)
        .map(|h| {
            TimeRange::new(
                h.range.start.max(query.start),
                h.range.end.min(query.end),
            )
        })
        .collect();
    held.sort_by_key(|r| r.start);
    let held = merge_overlapping(&held);

    let mut free = subtract_ranges(&[*query], &held);
    if let Some(min) = min_duration {
        free.retain(|w| w.duration_ms() >= min);
    }
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end {
                last.end = last.end.max(range.end);
                continue;
            }
        merged.push(range);
    }
    merged
}

pub fn subtract_ranges(base: &[TimeRange], to_remove: &[TimeRange]) -> Vec<TimeRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeRange::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeRange::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn slots_with(holds: Vec<(Ms, Ms)>) -> ProviderSlots {
        let mut ps = ProviderSlots::new(ulid::Ulid::new());
        for (start, end) in holds {
            ps.insert_hold(SlotHold {
                slot_id: ulid::Ulid::new(),
                booking_id: ulid::Ulid::new(),
                range: TimeRange::new(start, end),
                service_type: None,
            });
        }
        ps
    }

    // ── subtract_ranges ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![TimeRange::new(100, 200), TimeRange::new(300, 400)];
        let remove = vec![TimeRange::new(200, 300)];
        let result = subtract_ranges(&base, &remove);
        assert_eq!(result, base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![TimeRange::new(100, 200)];
        let remove = vec![TimeRange::new(50, 250)];
        let result = subtract_ranges(&base, &remove);
        assert!(result.is_empty());
    }

    #[test]
    fn subtract_partial_left() {
        let base = vec![TimeRange::new(100, 200)];
        let remove = vec![TimeRange::new(50, 150)];
        let result = subtract_ranges(&base, &remove);
        assert_eq!(result, vec![TimeRange::new(150, 200)]);
    }

    #[test]
    fn subtract_partial_right() {
        let base = vec![TimeRange::new(100, 200)];
        let remove = vec![TimeRange::new(150, 250)];
        let result = subtract_ranges(&base, &remove);
        assert_eq!(result, vec![TimeRange::new(100, 150)]);
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![TimeRange::new(100, 300)];
        let remove = vec![TimeRange::new(150, 200)];
        let result = subtract_ranges(&base, &remove);
        assert_eq!(result, vec![TimeRange::new(100, 150), TimeRange::new(200, 300)]);
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![TimeRange::new(0, 1000)];
        let remove = vec![
            TimeRange::new(100, 200),
            TimeRange::new(400, 500),
            TimeRange::new(800, 900),
        ];
        let result = subtract_ranges(&base, &remove);
        assert_eq!(
            result,
            vec![
                TimeRange::new(0, 100),
                TimeRange::new(200, 400),
                TimeRange::new(500, 800),
                TimeRange::new(900, 1000),
            ]
        );
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let ranges = vec![
            TimeRange::new(100, 300),
            TimeRange::new(200, 400),
            TimeRange::new(500, 600),
        ];
        let merged = merge_overlapping(&ranges);
        assert_eq!(merged, vec![TimeRange::new(100, 400), TimeRange::new(500, 600)]);
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let ranges = vec![TimeRange::new(100, 200), TimeRange::new(200, 300)];
        let merged = merge_overlapping(&ranges);
        assert_eq!(merged, vec![TimeRange::new(100, 300)]);
    }

    // ── free_windows_in ────────────────────────────────

    #[test]
    fn free_windows_basic() {
        let ten = 10 * H;
        let ten_thirty = ten + 30 * M;
        let slots = slots_with(vec![(ten, ten_thirty)]);
        let query = TimeRange::new(9 * H, 12 * H);
        let free = free_windows_in(&slots, &query, None);
        assert_eq!(free.len(), 2);
        assert_eq!(free[0], TimeRange::new(9 * H, ten));
        assert_eq!(free[1], TimeRange::new(ten_thirty, 12 * H));
    }

    #[test]
    fn free_windows_empty_schedule_is_whole_window() {
        let slots = slots_with(vec![]);
        let query = TimeRange::new(9 * H, 17 * H);
        let free = free_windows_in(&slots, &query, None);
        assert_eq!(free, vec![query]);
    }

    #[test]
    fn free_windows_fully_booked() {
        let slots = slots_with(vec![(9 * H, 17 * H)]);
        let query = TimeRange::new(10 * H, 12 * H);
        let free = free_windows_in(&slots, &query, None);
        assert!(free.is_empty());
    }

    #[test]
    fn free_windows_clamps_to_query() {
        // Hold spilling past both query edges only blanks the inside.
        let slots = slots_with(vec![(8 * H, 10 * H), (16 * H, 18 * H)]);
        let query = TimeRange::new(9 * H, 17 * H);
        let free = free_windows_in(&slots, &query, None);
        assert_eq!(free, vec![TimeRange::new(10 * H, 16 * H)]);
    }

    #[test]
    fn free_windows_min_duration_filters() {
        // Gap of 30m between holds; only the hour-long tail survives a 1h floor.
        let slots = slots_with(vec![(9 * H, 10 * H), (10 * H + 30 * M, 11 * H)]);
        let query = TimeRange::new(9 * H, 12 * H);
        let free = free_windows_in(&slots, &query, Some(H));
        assert_eq!(free, vec![TimeRange::new(11 * H, 12 * H)]);
    }

    #[test]
    fn free_windows_back_to_back_holds_merge() {
        let slots = slots_with(vec![(9 * H, 10 * H), (10 * H, 11 * H)]);
        let query = TimeRange::new(9 * H, 12 * H);
        let free = free_windows_in(&slots, &query, None);
        assert_eq!(free, vec![TimeRange::new(11 * H, 12 * H)]);
    }
}
