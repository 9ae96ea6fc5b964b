use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    /// Every question has a correct answer; progress commit pending or in flight.
    Completed,
}

/// One user's in-progress attempt at one lesson, stored under `session:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSession {
    pub session_id: String,
    pub user_id: i64,
    pub lesson_id: i64,
    pub started_at: DateTime<Utc>,
    pub correct_answers: BTreeMap<i64, Option<i64>>,
    /// Questions answered correctly on the first attempt, no repeats.
    pub answered_correctly: Vec<i64>,
    /// Questions whose first attempt was wrong, no repeats. Disjoint from
    /// `answered_correctly`.
    pub answered_incorrectly: Vec<i64>,
    /// Missed questions that were later answered correctly. Subset of
    /// `answered_incorrectly`.
    #[serde(default)]
    pub resolved: Vec<i64>,
    pub status: SessionStatus,
    /// Bumped on every write; makes each stored revision byte-distinct for compare-and-set.
    pub version: u64,
}

/// What a single submission did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    /// False when the submission left the session unchanged.
    pub recorded: bool,
}

impl LessonSession {
    /// Session id for the (lesson, user) pair. Deterministic: one open attempt per pair.
    pub fn id_for(lesson_id: i64, user_id: i64) -> String {
        format!("{}-{}", lesson_id, user_id)
    }

    pub fn new(
        user_id: i64,
        lesson_id: i64,
        started_at: DateTime<Utc>,
        correct_answers: BTreeMap<i64, Option<i64>>,
    ) -> Self {
        Self {
            session_id: Self::id_for(lesson_id, user_id),
            user_id,
            lesson_id,
            started_at,
            correct_answers,
            answered_correctly: Vec::new(),
            answered_incorrectly: Vec::new(),
            resolved: Vec::new(),
            status: SessionStatus::Active,
            version: 0,
        }
    }

    pub fn total_questions(&self) -> usize {
        self.correct_answers.len()
    }

    pub fn is_time_expired(&self, now: DateTime<Utc>, limit: Duration) -> bool {
        now - self.started_at > limit
    }

    /// Compares against the stored ground truth. Unknown questions and
    /// questions without a recorded correct answer are never correct.
    pub fn evaluate(&self, question_id: i64, answer_id: i64) -> bool {
        matches!(
            self.correct_answers.get(&question_id),
            Some(Some(correct)) if *correct == answer_id
        )
    }

    /// Records a submission.
    ///
    /// The first attempt at a question decides which list it lands in, so
    /// the two answered lists never overlap. A later correct answer to a
    /// missed question only marks it resolved. Questions outside the lesson
    /// and questions already solved are not recorded.
    pub fn record_answer(&mut self, question_id: i64, answer_id: i64) -> AnswerOutcome {
        let is_correct = self.evaluate(question_id, answer_id);
        let unchanged = AnswerOutcome {
            is_correct,
            recorded: false,
        };

        if !self.correct_answers.contains_key(&question_id) || self.is_solved(question_id) {
            return unchanged;
        }

        let missed = self.answered_incorrectly.contains(&question_id);
        match (is_correct, missed) {
            (true, true) => self.resolved.push(question_id),
            (true, false) => self.answered_correctly.push(question_id),
            (false, false) => self.answered_incorrectly.push(question_id),
            (false, true) => return unchanged,
        }

        AnswerOutcome {
            is_correct,
            recorded: true,
        }
    }

    fn is_solved(&self, question_id: i64) -> bool {
        self.answered_correctly.contains(&question_id) || self.resolved.contains(&question_id)
    }

    /// True once every question of the lesson has a correct answer.
    pub fn is_complete(&self) -> bool {
        self.correct_answers.keys().all(|id| self.is_solved(*id))
    }
}

/// Short-lived outcome of a completed session, stored under `lesson_result:{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonResult {
    pub xp_earned: u32,
    pub success_percent: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn session() -> LessonSession {
        let answers = BTreeMap::from([(1, Some(11)), (2, Some(21)), (3, Some(31))]);
        LessonSession::new(
            42,
            5,
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            answers,
        )
    }

    #[test]
    fn session_id_is_deterministic_per_pair() {
        assert_eq!(LessonSession::id_for(5, 42), "5-42");
        assert_ne!(LessonSession::id_for(1, 23), LessonSession::id_for(12, 3));
        assert_eq!(session().session_id, "5-42");
    }

    #[test]
    fn repeated_answers_do_not_inflate_counts() {
        let mut s = session();

        assert!(s.record_answer(1, 11).recorded);
        assert!(!s.record_answer(1, 11).recorded);
        assert!(!s.record_answer(1, 10).recorded);

        assert!(s.record_answer(2, 20).recorded);
        assert!(!s.record_answer(2, 22).recorded);

        assert_eq!(s.answered_correctly, vec![1]);
        assert_eq!(s.answered_incorrectly, vec![2]);
    }

    #[test]
    fn missed_question_can_still_be_answered_correctly() {
        let mut s = session();
        s.record_answer(1, 11);
        s.record_answer(2, 20);
        assert!(s.record_answer(2, 21).recorded);
        assert!(!s.record_answer(2, 21).recorded);
        s.record_answer(3, 31);

        assert!(s.is_complete());
        assert_eq!(s.answered_correctly, vec![1, 3]);
        assert_eq!(s.answered_incorrectly, vec![2]);
        assert_eq!(s.resolved, vec![2]);
    }

    #[test]
    fn answered_lists_stay_disjoint_when_every_question_is_missed_first() {
        let mut s = session();
        for (question, correct) in [(1, 11), (2, 21), (3, 31)] {
            s.record_answer(question, correct - 1);
            s.record_answer(question, correct);
        }

        assert!(s.is_complete());
        assert!(s.answered_correctly.is_empty());
        assert_eq!(s.answered_incorrectly, vec![1, 2, 3]);
        assert_eq!(
            s.answered_correctly.len() + s.answered_incorrectly.len(),
            s.total_questions()
        );
    }

    #[test]
    fn sessions_without_resolved_field_still_deserialize() {
        let mut value = serde_json::to_value(session()).unwrap();
        value.as_object_mut().unwrap().remove("resolved");

        let restored: LessonSession = serde_json::from_value(value).unwrap();
        assert!(restored.resolved.is_empty());
    }

    #[test]
    fn unknown_question_is_incorrect_and_unrecorded() {
        let mut s = session();
        let outcome = s.record_answer(99, 11);

        assert_eq!(
            outcome,
            AnswerOutcome {
                is_correct: false,
                recorded: false
            }
        );
        assert!(s.answered_incorrectly.is_empty());
    }

    #[test]
    fn question_without_ground_truth_is_never_correct() {
        let mut s = session();
        s.correct_answers.insert(4, None);

        let outcome = s.record_answer(4, 41);
        assert!(!outcome.is_correct);
        assert!(outcome.recorded);
        assert!(!s.is_complete());
    }

    #[test]
    fn time_limit_is_exclusive() {
        let s = session();
        let limit = Duration::minutes(30);

        assert!(!s.is_time_expired(s.started_at + Duration::minutes(30), limit));
        assert!(s.is_time_expired(s.started_at + Duration::minutes(31), limit));
    }

    proptest! {
        #[test]
        fn any_submission_order_keeps_lists_disjoint_and_bounded(
            submissions in prop::collection::vec((0i64..5, 10i64..45), 0..40)
        ) {
            let mut s = session();
            for (question, answer) in submissions {
                s.record_answer(question, answer);
            }

            let total = s.total_questions();
            prop_assert!(s.answered_correctly.len() + s.answered_incorrectly.len() <= total);
            prop_assert!(s
                .answered_correctly
                .iter()
                .all(|q| !s.answered_incorrectly.contains(q)));
            prop_assert!(s.resolved.iter().all(|q| s.answered_incorrectly.contains(q)));
            let solved = s.answered_correctly.len() + s.resolved.len();
            prop_assert_eq!(s.is_complete(), solved == total);
        }
    }
}
