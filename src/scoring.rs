//! Time-weighted scoring of a single answer.
//!
//! Pure functions only: the room decides *when* to score, this module decides
//! *how much*.

use crate::types::SubmittedAnswer;

/// Points for any correct answer, regardless of speed.
pub const BASE_POINTS: u32 = 100;
/// Extra points for an instant correct answer, decaying linearly to zero at the deadline.
pub const SPEED_BONUS_MAX: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub is_correct: bool,
    pub points: u32,
}

/// Resolve a submission to an option index.
///
/// Text must equal an option label up to letter case; surrounding whitespace
/// counts. Returns `None` for out-of-range indices and text that matches no option.
pub fn normalize(answer: &SubmittedAnswer, options: &[String]) -> Option<usize> {
    match answer {
        SubmittedAnswer::Index(index) => (*index < options.len()).then_some(*index),
        SubmittedAnswer::Text(text) => {
            let wanted = text.to_lowercase();
            options
                .iter()
                .position(|option| option.to_lowercase() == wanted)
        }
    }
}

/// Score one answer.
///
/// `elapsed_seconds` is clamped into `[0, time_limit_seconds]`, so a late but
/// correct answer still earns [`BASE_POINTS`].
pub fn score(
    correct_index: usize,
    options: &[String],
    submitted: Option<&SubmittedAnswer>,
    elapsed_seconds: f64,
    time_limit_seconds: u32,
) -> Score {
    let is_correct = submitted
        .and_then(|answer| normalize(answer, options))
        .is_some_and(|index| index == correct_index);

    if !is_correct {
        return Score {
            is_correct: false,
            points: 0,
        };
    }

    Score {
        is_correct: true,
        points: BASE_POINTS + speed_bonus(elapsed_seconds, time_limit_seconds),
    }
}

fn speed_bonus(elapsed_seconds: f64, time_limit_seconds: u32) -> u32 {
    if time_limit_seconds == 0 {
        return 0;
    }
    let limit = f64::from(time_limit_seconds);
    let elapsed = if elapsed_seconds.is_finite() {
        elapsed_seconds.clamp(0.0, limit)
    } else {
        limit
    };
    let remaining_ratio = ((limit - elapsed) / limit).max(0.0);
    (f64::from(SPEED_BONUS_MAX) * remaining_ratio).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        ["Mercury", "Venus", "Earth", "Mars"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn correct_answer_in_five_of_thirty_seconds() {
        let result = score(2, &options(), Some(&SubmittedAnswer::Index(2)), 5.0, 30);
        assert!(result.is_correct);
        assert_eq!(result.points, 183);
    }

    #[test]
    fn instant_and_deadline_answers_bound_the_range() {
        let instant = score(1, &options(), Some(&SubmittedAnswer::Index(1)), 0.0, 20);
        let at_deadline = score(1, &options(), Some(&SubmittedAnswer::Index(1)), 20.0, 20);
        let past_deadline = score(1, &options(), Some(&SubmittedAnswer::Index(1)), 25.0, 20);
        assert_eq!(instant.points, BASE_POINTS + SPEED_BONUS_MAX);
        assert_eq!(at_deadline.points, BASE_POINTS);
        assert_eq!(past_deadline.points, BASE_POINTS);
    }

    #[test]
    fn faster_correct_answers_never_score_less() {
        let opts = options();
        let mut previous = u32::MAX;
        for tenth in 0..=300 {
            let elapsed = f64::from(tenth) / 10.0;
            let points = score(3, &opts, Some(&SubmittedAnswer::Index(3)), elapsed, 30).points;
            assert!(points <= previous, "points rose at {elapsed}s");
            previous = points;
        }
    }

    #[test]
    fn wrong_and_missing_answers_score_below_any_correct_one() {
        let opts = options();
        let wrong = score(0, &opts, Some(&SubmittedAnswer::Index(1)), 0.0, 30);
        let missing = score(0, &opts, None, 0.0, 30);
        let slowest_correct = score(0, &opts, Some(&SubmittedAnswer::Index(0)), 30.0, 30);
        assert_eq!(wrong, Score { is_correct: false, points: 0 });
        assert_eq!(missing, Score { is_correct: false, points: 0 });
        assert!(slowest_correct.points > wrong.points);
    }

    #[test]
    fn text_answers_resolve_case_insensitively() {
        let opts = options();
        assert_eq!(normalize(&SubmittedAnswer::Text("earth".into()), &opts), Some(2));
        assert_eq!(normalize(&SubmittedAnswer::Text("  earth ".into()), &opts), None);
        assert_eq!(normalize(&SubmittedAnswer::Text("MARS".into()), &opts), Some(3));
        assert_eq!(normalize(&SubmittedAnswer::Text("Pluto".into()), &opts), None);
        assert_eq!(normalize(&SubmittedAnswer::Index(4), &opts), None);

        let by_text = score(2, &opts, Some(&SubmittedAnswer::Text("EARTH".into())), 10.0, 30);
        assert!(by_text.is_correct);
    }

    #[test]
    fn non_finite_elapsed_earns_no_bonus() {
        let result = score(0, &options(), Some(&SubmittedAnswer::Index(0)), f64::NAN, 30);
        assert_eq!(result.points, BASE_POINTS);
    }
}
