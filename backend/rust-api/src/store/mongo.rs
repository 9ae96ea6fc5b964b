//! MongoDB-backed durable store.
//!
//! Collections: `languages`, `lessons`, `questions` (answers embedded),
//! `users`, `user_progress` and `counters` (integer id sequences).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use super::{DurableStore, DurableTx, NewLanguage, NewLesson, StoreError};
use crate::metrics::track_db_operation;
use crate::models::{
    Answer, Language, Lesson, NewAnswer, NewProgress, NewUser, Question, User, UserProgress,
    UserStatsUpdate,
};
use crate::utils::time::chrono_to_bson;

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

fn map_error(err: mongodb::error::Error) -> StoreError {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        return StoreError::Conflict("Concurrent update, please retry".into());
    }
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
            StoreError::Serialization(err.to_string())
        }
        _ if is_duplicate_key(&err) => StoreError::Conflict(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

// Serde converter for chrono::DateTime <-> mongodb::bson::DateTime
mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| de::Error::custom("timestamp out of range"))
    }
}

mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let bson_dt = bson::DateTime::from_millis(d.timestamp_millis());
                serializer.serialize_some(&bson_dt)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_bson_dt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        opt_bson_dt
            .map(|bson_dt| {
                DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
                    .ok_or_else(|| de::Error::custom("timestamp out of range"))
            })
            .transpose()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CounterDoc {
    #[serde(rename = "_id")]
    id: String,
    seq: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguageDoc {
    #[serde(rename = "_id")]
    id: i64,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    picture: String,
    #[serde(default)]
    level: i32,
    #[serde(default)]
    popularity: i32,
}

impl From<LanguageDoc> for Language {
    fn from(doc: LanguageDoc) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            description: doc.description,
            picture: doc.picture,
            level: doc.level,
            popularity: doc.popularity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LessonDoc {
    #[serde(rename = "_id")]
    id: i64,
    title: String,
    #[serde(default)]
    description: String,
    language_id: i64,
}

impl From<LessonDoc> for Lesson {
    fn from(doc: LessonDoc) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            description: doc.description,
            language_id: doc.language_id,
            questions: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AnswerDoc {
    id: i64,
    text: String,
    is_correct: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuestionDoc {
    #[serde(rename = "_id")]
    id: i64,
    lesson_id: i64,
    text: String,
    answers: Vec<AnswerDoc>,
}

impl From<QuestionDoc> for Question {
    fn from(doc: QuestionDoc) -> Self {
        Self {
            id: doc.id,
            lesson_id: doc.lesson_id,
            text: doc.text,
            answers: doc
                .answers
                .into_iter()
                .map(|a| Answer {
                    id: a.id,
                    text: a.text,
                    is_correct: a.is_correct,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id")]
    id: i64,
    first_name: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    xp: i64,
    #[serde(default)]
    streak: i64,
    #[serde(default, with = "bson_datetime_as_chrono_option")]
    last_lesson_date: Option<DateTime<Utc>>,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    active_language_id: Option<i64>,
    #[serde(with = "bson_datetime_as_chrono")]
    created_at: DateTime<Utc>,
}

impl From<UserDoc> for User {
    fn from(doc: UserDoc) -> Self {
        Self {
            id: doc.id,
            first_name: doc.first_name,
            username: doc.username,
            xp: doc.xp,
            streak: u32::try_from(doc.streak).unwrap_or_default(),
            last_lesson_date: doc.last_lesson_date,
            timezone: doc.timezone,
            active_language_id: doc.active_language_id,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressDoc {
    #[serde(rename = "_id")]
    id: ObjectId,
    user_id: i64,
    lesson_id: i64,
    xp_earned: i64,
    success_percent: i64,
    #[serde(with = "bson_datetime_as_chrono")]
    completed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    fn languages(&self) -> Collection<LanguageDoc> {
        self.db.collection("languages")
    }

    fn lessons(&self) -> Collection<LessonDoc> {
        self.db.collection("lessons")
    }

    fn questions(&self) -> Collection<QuestionDoc> {
        self.db.collection("questions")
    }

    fn users(&self) -> Collection<UserDoc> {
        self.db.collection("users")
    }

    fn progress(&self) -> Collection<ProgressDoc> {
        self.db.collection("user_progress")
    }

    /// Creates the indexes the store relies on. Idempotent.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_name = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.languages()
            .create_index(unique_name)
            .await
            .map_err(map_error)?;

        let by_lesson = IndexModel::builder().keys(doc! { "lesson_id": 1 }).build();
        self.questions()
            .create_index(by_lesson)
            .await
            .map_err(map_error)?;

        let by_user = IndexModel::builder()
            .keys(doc! { "user_id": 1, "lesson_id": 1 })
            .build();
        self.progress()
            .create_index(by_user)
            .await
            .map_err(map_error)?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError> {
        let counter = track_db_operation(
            "find_one_and_update",
            "counters",
            self.db
                .collection::<CounterDoc>("counters")
                .find_one_and_update(doc! { "_id": sequence }, doc! { "$inc": { "seq": 1_i64 } })
                .upsert(true)
                .return_document(ReturnDocument::After),
        )
        .await
        .map_err(map_error)?
        .ok_or_else(|| {
            StoreError::Backend(format!("counter '{}' missing after upsert", sequence))
        })?;
        Ok(counter.seq)
    }
}

#[async_trait]
impl DurableStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn get_lesson_with_questions(
        &self,
        lesson_id: i64,
    ) -> Result<Option<Lesson>, StoreError> {
        let Some(lesson) = track_db_operation(
            "find_one",
            "lessons",
            self.lessons().find_one(doc! { "_id": lesson_id }),
        )
        .await
        .map_err(map_error)?
        else {
            return Ok(None);
        };

        let questions: Vec<QuestionDoc> = track_db_operation("find", "questions", async {
            self.questions()
                .find(doc! { "lesson_id": lesson_id })
                .sort(doc! { "_id": 1 })
                .await?
                .try_collect()
                .await
        })
        .await
        .map_err(map_error)?;

        let mut lesson = Lesson::from(lesson);
        lesson.questions = questions.into_iter().map(Question::from).collect();
        Ok(Some(lesson))
    }

    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        let docs: Vec<LessonDoc> = track_db_operation("find", "lessons", async {
            self.lessons()
                .find(doc! {})
                .sort(doc! { "_id": 1 })
                .await?
                .try_collect()
                .await
        })
        .await
        .map_err(map_error)?;

        Ok(docs.into_iter().map(Lesson::from).collect())
    }

    async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson, StoreError> {
        let doc = LessonDoc {
            id: self.next_id("lessons").await?,
            title: lesson.title,
            description: lesson.description,
            language_id: lesson.language_id,
        };
        track_db_operation("insert_one", "lessons", self.lessons().insert_one(&doc))
            .await
            .map_err(map_error)?;
        Ok(Lesson::from(doc))
    }

    async fn first_unfinished_lesson(&self, user_id: i64) -> Result<Option<Lesson>, StoreError> {
        let finished: Vec<Bson> = track_db_operation(
            "distinct",
            "user_progress",
            self.progress()
                .distinct("lesson_id", doc! { "user_id": user_id }),
        )
        .await
        .map_err(map_error)?;

        let lesson = track_db_operation(
            "find_one",
            "lessons",
            self.lessons()
                .find_one(doc! { "_id": { "$nin": finished } })
                .sort(doc! { "_id": 1 }),
        )
        .await
        .map_err(map_error)?;

        Ok(lesson.map(Lesson::from))
    }

    async fn create_question(
        &self,
        lesson_id: i64,
        text: &str,
        answers: &[NewAnswer],
    ) -> Result<Question, StoreError> {
        let id = self.next_id("questions").await?;
        let mut answer_docs = Vec::with_capacity(answers.len());
        for answer in answers {
            answer_docs.push(AnswerDoc {
                id: self.next_id("answers").await?,
                text: answer.text.clone(),
                is_correct: answer.is_correct,
            });
        }

        let doc = QuestionDoc {
            id,
            lesson_id,
            text: text.to_string(),
            answers: answer_docs,
        };
        track_db_operation("insert_one", "questions", self.questions().insert_one(&doc))
            .await
            .map_err(map_error)?;
        Ok(Question::from(doc))
    }

    async fn list_languages(&self) -> Result<Vec<Language>, StoreError> {
        let docs: Vec<LanguageDoc> = track_db_operation("find", "languages", async {
            self.languages()
                .find(doc! {})
                .sort(doc! { "_id": 1 })
                .await?
                .try_collect()
                .await
        })
        .await
        .map_err(map_error)?;

        Ok(docs.into_iter().map(Language::from).collect())
    }

    async fn get_language(&self, language_id: i64) -> Result<Option<Language>, StoreError> {
        let doc = track_db_operation(
            "find_one",
            "languages",
            self.languages().find_one(doc! { "_id": language_id }),
        )
        .await
        .map_err(map_error)?;
        Ok(doc.map(Language::from))
    }

    async fn create_language(&self, language: NewLanguage) -> Result<Language, StoreError> {
        let doc = LanguageDoc {
            id: self.next_id("languages").await?,
            name: language.name,
            description: language.description,
            picture: language.picture,
            level: language.level,
            popularity: language.popularity,
        };
        track_db_operation("insert_one", "languages", self.languages().insert_one(&doc))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::Conflict(format!("Language '{}' already exists", doc.name))
                } else {
                    map_error(e)
                }
            })?;
        Ok(Language::from(doc))
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let doc = track_db_operation(
            "find_one",
            "users",
            self.users().find_one(doc! { "_id": user_id }),
        )
        .await
        .map_err(map_error)?;
        Ok(doc.map(User::from))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let doc = UserDoc {
            id: user.id,
            first_name: user.first_name,
            username: user.username,
            xp: 0,
            streak: 0,
            last_lesson_date: None,
            timezone: user.timezone,
            active_language_id: None,
            created_at: Utc::now(),
        };
        track_db_operation("insert_one", "users", self.users().insert_one(&doc))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::Conflict(format!("User {} already exists", doc.id))
                } else {
                    map_error(e)
                }
            })?;
        Ok(User::from(doc))
    }

    async fn set_active_language(&self, user_id: i64, language_id: i64) -> Result<(), StoreError> {
        track_db_operation(
            "update_one",
            "users",
            self.users().update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "active_language_id": language_id } },
            ),
        )
        .await
        .map_err(map_error)?;
        Ok(())
    }

    async fn reset_streak(&self, user_id: i64) -> Result<(), StoreError> {
        track_db_operation(
            "update_one",
            "users",
            self.users()
                .update_one(doc! { "_id": user_id }, doc! { "$set": { "streak": 0_i64 } }),
        )
        .await
        .map_err(map_error)?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn DurableTx>, StoreError> {
        let mut session = self.client.start_session().await.map_err(map_error)?;
        session.start_transaction().await.map_err(map_error)?;
        Ok(Box::new(MongoTx {
            session,
            db: self.db.clone(),
        }))
    }
}

/// Multi-document transaction. The driver aborts it if dropped uncommitted.
struct MongoTx {
    session: ClientSession,
    db: Database,
}

#[async_trait]
impl DurableTx for MongoTx {
    async fn get_user(&mut self, user_id: i64) -> Result<Option<User>, StoreError> {
        let doc = track_db_operation(
            "find_one",
            "users",
            self.db
                .collection::<UserDoc>("users")
                .find_one(doc! { "_id": user_id })
                .session(&mut self.session),
        )
        .await
        .map_err(map_error)?;
        Ok(doc.map(User::from))
    }

    async fn insert_progress(&mut self, progress: NewProgress) -> Result<UserProgress, StoreError> {
        let doc = ProgressDoc {
            id: ObjectId::new(),
            user_id: progress.user_id,
            lesson_id: progress.lesson_id,
            xp_earned: i64::from(progress.xp_earned),
            success_percent: i64::from(progress.success_percent),
            completed_at: progress.completed_at,
        };
        track_db_operation(
            "insert_one",
            "user_progress",
            self.db
                .collection::<ProgressDoc>("user_progress")
                .insert_one(&doc)
                .session(&mut self.session),
        )
        .await
        .map_err(map_error)?;

        Ok(UserProgress {
            id: doc.id.to_hex(),
            user_id: progress.user_id,
            lesson_id: progress.lesson_id,
            xp_earned: progress.xp_earned,
            success_percent: progress.success_percent,
            completed_at: progress.completed_at,
        })
    }

    async fn update_user_xp_and_streak(
        &mut self,
        user_id: i64,
        update: UserStatsUpdate,
    ) -> Result<(), StoreError> {
        let result = track_db_operation(
            "update_one",
            "users",
            self.db
                .collection::<UserDoc>("users")
                .update_one(
                    doc! { "_id": user_id },
                    doc! {
                        "$inc": { "xp": i64::from(update.xp_delta) },
                        "$set": {
                            "streak": i64::from(update.streak),
                            "last_lesson_date": chrono_to_bson(update.last_lesson_date),
                        },
                    },
                )
                .session(&mut self.session),
        )
        .await
        .map_err(map_error)?;

        if result.matched_count == 0 {
            return Err(StoreError::Backend(format!("user {} vanished", user_id)));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.session.commit_transaction().await.map_err(map_error)
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.session.abort_transaction().await.map_err(map_error)
    }
}
