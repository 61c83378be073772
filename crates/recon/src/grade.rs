//! Grade inference: pick a canonical grade label for a group of records
//! from the distribution of a weak per-record age signal.

use std::collections::BTreeMap;

use crate::config::TieBreak;
use crate::model::{GradeInference, GradeLabel};

/// Infer the grade label for one group.
///
/// `None` signals are excluded from the histogram. An empty histogram
/// yields `UNCLASSIFIED` rather than a guess. Among tied contenders the
/// `tie_break` direction decides; `tie_broken` is set so downstream
/// review can see the call was not unanimous.
pub fn infer_grade(
    group_id: &str,
    signals: &[Option<i32>],
    rules: &BTreeMap<i32, String>,
    tie_break: TieBreak,
) -> GradeInference {
    let mut histogram: BTreeMap<i32, usize> = BTreeMap::new();
    for signal in signals.iter().flatten() {
        *histogram.entry(*signal).or_insert(0) += 1;
    }

    if histogram.is_empty() {
        return GradeInference {
            group_id: group_id.to_string(),
            histogram,
            label: GradeLabel::Unclassified(None),
            tie_broken: false,
        };
    }

    // Single pass over the (sorted) histogram: track the winning
    // (value, count) under the tie policy and how many values share the
    // winning count.
    let mut winner = (0i32, 0usize);
    let mut contenders = 0usize;
    for (&value, &count) in &histogram {
        if count > winner.1 {
            winner = (value, count);
            contenders = 1;
        } else if count == winner.1 {
            contenders += 1;
            let prefer = match tie_break {
                TieBreak::Highest => value > winner.0,
                TieBreak::Lowest => value < winner.0,
            };
            if prefer {
                winner = (value, count);
            }
        }
    }

    let label = match rules.get(&winner.0) {
        Some(name) => GradeLabel::Known(name.clone()),
        None => GradeLabel::Unclassified(Some(winner.0)),
    };

    GradeInference {
        group_id: group_id.to_string(),
        histogram,
        label,
        tie_broken: contenders > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> BTreeMap<i32, String> {
        [(6, "1st"), (7, "2nd"), (8, "3rd"), (9, "4th"), (10, "5th")]
            .into_iter()
            .map(|(age, label)| (age, label.to_string()))
            .collect()
    }

    #[test]
    fn majority_wins() {
        let signals = [Some(9), Some(9), Some(9), Some(8), None];
        let g = infer_grade("4A", &signals, &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Known("4th".to_string()));
        assert!(!g.tie_broken);
        assert_eq!(g.histogram.get(&9), Some(&3));
        assert_eq!(g.histogram.get(&8), Some(&1));
    }

    #[test]
    fn unknown_signals_are_excluded_not_counted() {
        let signals = [Some(7), None, None, None];
        let g = infer_grade("2B", &signals, &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Known("2nd".to_string()));
    }

    #[test]
    fn empty_histogram_is_unclassified() {
        let signals = [None, None];
        let g = infer_grade("X", &signals, &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Unclassified(None));
        assert!(g.histogram.is_empty());
        assert!(!g.tie_broken);

        let g = infer_grade("Y", &[], &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Unclassified(None));
    }

    #[test]
    fn tie_resolves_to_highest_signal_by_default() {
        let signals = [Some(8), Some(8), Some(9), Some(9)];
        let g = infer_grade("T", &signals, &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Known("4th".to_string()));
        assert!(g.tie_broken);
    }

    #[test]
    fn tie_can_resolve_to_lowest() {
        let signals = [Some(8), Some(8), Some(9), Some(9)];
        let g = infer_grade("T", &signals, &rules(), TieBreak::Lowest);
        assert_eq!(g.label, GradeLabel::Known("3rd".to_string()));
        assert!(g.tie_broken);
    }

    #[test]
    fn three_way_tie_still_flagged() {
        let signals = [Some(6), Some(7), Some(8)];
        let g = infer_grade("T", &signals, &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Known("3rd".to_string()));
        assert!(g.tie_broken);
    }

    #[test]
    fn unmapped_winner_reports_the_signal() {
        let signals = [Some(14), Some(14), Some(6)];
        let g = infer_grade("U", &signals, &rules(), TieBreak::Highest);
        assert_eq!(g.label, GradeLabel::Unclassified(Some(14)));
        assert_eq!(g.label.to_string(), "UNCLASSIFIED (signal=14)");
        assert!(!g.tie_broken);
    }

    #[test]
    fn permutation_invariant() {
        let a = [Some(8), Some(9), Some(9), None, Some(8)];
        let b = [Some(9), None, Some(8), Some(8), Some(9)];
        let ga = infer_grade("P", &a, &rules(), TieBreak::Highest);
        let gb = infer_grade("P", &b, &rules(), TieBreak::Highest);
        assert_eq!(ga.label, gb.label);
        assert_eq!(ga.histogram, gb.histogram);
        assert_eq!(ga.tie_broken, gb.tie_broken);
    }
}
