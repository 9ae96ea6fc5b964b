use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lesson with its ordered questions, as loaded from the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub language_id: i64,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub lesson_id: i64,
    pub text: String,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

impl Question {
    /// Id of the answer flagged correct, if any.
    pub fn correct_answer_id(&self) -> Option<i64> {
        self.answers.iter().find(|a| a.is_correct).map(|a| a.id)
    }
}

/// Denormalized lesson content stored under `lesson:{id}:data`.
///
/// Answer correctness is stripped from `questions` and kept only in
/// `correct_answers` (question id -> correct answer id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCacheEntry {
    pub lesson_id: i64,
    pub questions: Vec<CachedQuestion>,
    pub correct_answers: BTreeMap<i64, Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedQuestion {
    pub question_id: i64,
    pub question_text: String,
    pub answers: Vec<CachedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub answer_id: i64,
    pub answer_text: String,
}

impl From<&Lesson> for LessonCacheEntry {
    fn from(lesson: &Lesson) -> Self {
        let questions = lesson
            .questions
            .iter()
            .map(|q| CachedQuestion {
                question_id: q.id,
                question_text: q.text.clone(),
                answers: q
                    .answers
                    .iter()
                    .map(|a| CachedAnswer {
                        answer_id: a.id,
                        answer_text: a.text.clone(),
                    })
                    .collect(),
            })
            .collect();

        let correct_answers = lesson
            .questions
            .iter()
            .map(|q| (q.id, q.correct_answer_id()))
            .collect();

        Self {
            lesson_id: lesson.id,
            questions,
            correct_answers,
        }
    }
}

impl LessonCacheEntry {
    /// Client payload for a freshly started session.
    pub fn start_response(&self, session_id: &str) -> StartLessonResponse {
        StartLessonResponse {
            session_id: session_id.to_string(),
            questions: self
                .questions
                .iter()
                .map(|q| QuestionResponse {
                    question_id: q.question_id,
                    text: q.question_text.clone(),
                    answers: q
                        .answers
                        .iter()
                        .map(|a| AnswerResponse {
                            answer_id: a.answer_id,
                            answer_text: a.answer_text.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLessonRequest {
    pub user_id: i64,
    pub lesson_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLessonResponse {
    pub session_id: String,
    pub questions: Vec<QuestionResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question_id: i64,
    pub text: String,
    pub answers: Vec<AnswerResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer_id: i64,
    pub answer_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckLessonAnswerRequest {
    pub session_id: String,
    pub question_id: i64,
    pub answer_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLessonAnswerResponse {
    pub question_id: i64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    pub language_id: i64,
}

/// Catalogue view of a lesson (no questions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSummary {
    pub lesson_id: i64,
    pub language_id: i64,
    pub title: String,
    pub description: String,
}

impl From<&Lesson> for LessonSummary {
    fn from(lesson: &Lesson) -> Self {
        Self {
            lesson_id: lesson.id,
            language_id: lesson.language_id,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLessonResponse {
    pub lesson_id: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewAnswer {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[validate(length(equal = 4, message = "Exactly 4 answers required"))]
    pub answers: Vec<NewAnswer>,
    pub lesson_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuestionResponse {
    pub question_id: i64,
    pub text: String,
    pub answers: Vec<AnswerResponse>,
    pub lesson_id: i64,
}

impl From<&Question> for CreateQuestionResponse {
    fn from(question: &Question) -> Self {
        Self {
            question_id: question.id,
            text: question.text.clone(),
            answers: question
                .answers
                .iter()
                .map(|a| AnswerResponse {
                    answer_id: a.id,
                    answer_text: a.text.clone(),
                })
                .collect(),
            lesson_id: question.lesson_id,
        }
    }
}
