//! Editor-history helper (spec §4.7, pure). Given two CRDT snapshots and a
//! `clientID -> user-id` mapping, returns the set of users whose edits are
//! present in `to` but not in `from`.

use std::collections::BTreeSet;

use collab_types::doc::{Interval, Snapshot};
use collab_types::sync_context::UserMapping;

/// `intersect({c1,l1}, {c2,l2})`: the overlap of the two half-open ranges,
/// or `None` if they are disjoint (spec §4.7).
pub fn intersect(a: Interval, b: Interval) -> Option<Interval> {
	let clock = a.clock.max(b.clock);
	let end = a.end().min(b.end());
	if end > clock {
		Some(Interval::new(clock, end - clock))
	} else {
		None
	}
}

/// `subtract({c1,l1}, {c2,l2})`: up to two intervals covering `a` minus the
/// portion overlapping `b` (spec §4.7).
pub fn subtract(a: Interval, b: Interval) -> Vec<Interval> {
	let mut out = Vec::with_capacity(2);
	if a.clock < b.clock {
		let end = a.end().min(b.clock);
		if end > a.clock {
			out.push(Interval::new(a.clock, end - a.clock));
		}
	}
	if a.end() > b.end() {
		let start = a.clock.max(b.end());
		if a.end() > start {
			out.push(Interval::new(start, a.end() - start));
		}
	}
	out
}

fn subtract_all(interval: Interval, others: &[Interval]) -> Vec<Interval> {
	let mut remaining = vec![interval];
	for other in others {
		remaining = remaining.into_iter().flat_map(|r| subtract(r, *other)).collect();
		if remaining.is_empty() {
			break;
		}
	}
	remaining
}

/// `editorsBetween(from, to, mapping)` (spec §4.7).
pub fn editors_between(
	from: Option<&Snapshot>,
	to: &Snapshot,
	mapping: &UserMapping,
) -> BTreeSet<String> {
	let mut editors = BTreeSet::new();

	// First pass: insertions.
	for (&client, &to_clock) in &to.state_vector {
		let from_clock = from.map(|s| s.clock_for(client)).unwrap_or(0);
		if to_clock > from_clock {
			if let Some(user) = mapping.resolve(client) {
				editors.insert(user);
			}
		}
	}

	// Second pass: deletions.
	for (&client, to_intervals) in &to.delete_set {
		let from_intervals = from.map(|s| s.deletes_for(client)).unwrap_or(&[]);
		let has_residual = to_intervals
			.iter()
			.any(|interval| !subtract_all(*interval, from_intervals).is_empty());
		if has_residual {
			if let Some(user) = mapping.resolve(client) {
				editors.insert(user);
			}
		}
	}

	editors
}


// vim: ts=4
