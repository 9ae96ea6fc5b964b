//! In-memory gateways for tests and local prototyping.
//!
//! `MemoryStore` serializes units of work behind one async mutex and applies
//! a working copy on commit, so a rolled-back unit leaves no trace.
//! `MemoryCache` expires entries against the injected [`Clock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{CacheStore, DurableStore, DurableTx, NewLanguage, NewLesson, StoreError};
use crate::models::{
    Answer, Language, Lesson, NewAnswer, NewProgress, NewUser, Question, User, UserProgress,
    UserStatsUpdate,
};
use crate::utils::time::Clock;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    languages: BTreeMap<i64, Language>,
    lessons: BTreeMap<i64, Lesson>,
    questions: BTreeMap<i64, Question>,
    users: HashMap<i64, User>,
    progress: Vec<UserProgress>,
    sequence: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    fn lesson_with_questions(&self, lesson_id: i64) -> Option<Lesson> {
        let mut lesson = self.lessons.get(&lesson_id)?.clone();
        lesson.questions = self
            .questions
            .values()
            .filter(|q| q.lesson_id == lesson_id)
            .cloned()
            .collect();
        Some(lesson)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<AsyncMutex<MemoryState>>,
    clock: Clock,
    lesson_fetches: Arc<AtomicUsize>,
    fail_progress_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    /// Inserts a lesson together with its questions, keeping the given ids.
    pub async fn insert_lesson(&self, lesson: Lesson) {
        let mut state = self.state.lock().await;
        for question in &lesson.questions {
            state.questions.insert(question.id, question.clone());
        }
        let max_id = lesson
            .questions
            .iter()
            .flat_map(|q| std::iter::once(q.id).chain(q.answers.iter().map(|a| a.id)))
            .chain(std::iter::once(lesson.id))
            .max()
            .unwrap_or(0);
        state.sequence = state.sequence.max(max_id);
        state.lessons.insert(
            lesson.id,
            Lesson {
                questions: Vec::new(),
                ..lesson
            },
        );
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_language(&self, language: Language) {
        let mut state = self.state.lock().await;
        state.sequence = state.sequence.max(language.id);
        state.languages.insert(language.id, language);
    }

    pub async fn user(&self, user_id: i64) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn progress_for(&self, user_id: i64) -> Vec<UserProgress> {
        self.state
            .lock()
            .await
            .progress
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Number of `get_lesson_with_questions` calls served so far.
    pub fn lesson_fetches(&self) -> usize {
        self.lesson_fetches.load(Ordering::SeqCst)
    }

    /// Makes `insert_progress` fail inside units of work until switched off.
    pub fn fail_progress_writes(&self, fail: bool) {
        self.fail_progress_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_lesson_with_questions(
        &self,
        lesson_id: i64,
    ) -> Result<Option<Lesson>, StoreError> {
        self.lesson_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().await.lesson_with_questions(lesson_id))
    }

    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        Ok(self.state.lock().await.lessons.values().cloned().collect())
    }

    async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson, StoreError> {
        let mut state = self.state.lock().await;
        let lesson = Lesson {
            id: state.next_id(),
            title: lesson.title,
            description: lesson.description,
            language_id: lesson.language_id,
            questions: Vec::new(),
        };
        state.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn first_unfinished_lesson(&self, user_id: i64) -> Result<Option<Lesson>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .lessons
            .values()
            .find(|lesson| {
                !state
                    .progress
                    .iter()
                    .any(|p| p.user_id == user_id && p.lesson_id == lesson.id)
            })
            .cloned())
    }

    async fn create_question(
        &self,
        lesson_id: i64,
        text: &str,
        answers: &[NewAnswer],
    ) -> Result<Question, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let answers = answers
            .iter()
            .map(|a| Answer {
                id: state.next_id(),
                text: a.text.clone(),
                is_correct: a.is_correct,
            })
            .collect();
        let question = Question {
            id,
            lesson_id,
            text: text.to_string(),
            answers,
        };
        state.questions.insert(id, question.clone());
        Ok(question)
    }

    async fn list_languages(&self) -> Result<Vec<Language>, StoreError> {
        Ok(self.state.lock().await.languages.values().cloned().collect())
    }

    async fn get_language(&self, language_id: i64) -> Result<Option<Language>, StoreError> {
        Ok(self.state.lock().await.languages.get(&language_id).cloned())
    }

    async fn create_language(&self, language: NewLanguage) -> Result<Language, StoreError> {
        let mut state = self.state.lock().await;
        if state.languages.values().any(|l| l.name == language.name) {
            return Err(StoreError::Conflict(format!(
                "Language '{}' already exists",
                language.name
            )));
        }
        let language = Language {
            id: state.next_id(),
            name: language.name,
            description: language.description,
            picture: language.picture,
            level: language.level,
            popularity: language.popularity,
        };
        state.languages.insert(language.id, language.clone());
        Ok(language)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("User {} already exists", user.id)));
        }
        let user = User {
            id: user.id,
            first_name: user.first_name,
            username: user.username,
            xp: 0,
            streak: 0,
            last_lesson_date: None,
            timezone: user.timezone,
            active_language_id: None,
            created_at: self.clock.now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_active_language(&self, user_id: i64, language_id: i64) -> Result<(), StoreError> {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.active_language_id = Some(language_id);
        }
        Ok(())
    }

    async fn reset_streak(&self, user_id: i64) -> Result<(), StoreError> {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.streak = 0;
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn DurableTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
            fail_progress_writes: self.fail_progress_writes.clone(),
        }))
    }
}

struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
    fail_progress_writes: Arc<AtomicBool>,
}

impl MemoryTx {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Backend("transaction already finished".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableTx for MemoryTx {
    async fn get_user(&mut self, user_id: i64) -> Result<Option<User>, StoreError> {
        self.ensure_open()?;
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn insert_progress(&mut self, progress: NewProgress) -> Result<UserProgress, StoreError> {
        self.ensure_open()?;
        if self.fail_progress_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("progress insert failed".into()));
        }
        let id = self.working.next_id();
        let record = UserProgress {
            id: id.to_string(),
            user_id: progress.user_id,
            lesson_id: progress.lesson_id,
            xp_earned: progress.xp_earned,
            success_percent: progress.success_percent,
            completed_at: progress.completed_at,
        };
        self.working.progress.push(record.clone());
        Ok(record)
    }

    async fn update_user_xp_and_streak(
        &mut self,
        user_id: i64,
        update: UserStatsUpdate,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Backend(format!("user {} vanished", user_id)))?;
        user.xp += i64::from(update.xp_delta);
        user.streak = update.streak;
        user.last_lesson_date = Some(update.last_lesson_date);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".into()))?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take();
        Ok(())
    }
}

/// Key -> (value, expiry).
type Entries = HashMap<String, (String, DateTime<Utc>)>;

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<Entries>>,
    clock: Clock,
}

impl MemoryCache {
    pub fn new(clock: Clock) -> Self {
        Self {
            entries: Arc::default(),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, StoreError> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn expiry(&self, ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("invalid ttl: {}", e)))?;
        Ok(self.clock.now() + ttl)
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, key: &str) -> Option<chrono::Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .map(|(_, expires_at)| *expires_at - now)
            .filter(|left| *left > chrono::Duration::zero())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.expiry(ttl)?;
        self.lock()?
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((current, current_expiry)) if *current_expiry > now && current == expected => {
                entries.insert(key.to_string(), (value.to_string(), expires_at));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> Clock {
        Clock::manual(Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn cache_entries_expire_with_the_clock() {
        let clock = clock();
        let cache = MemoryCache::new(clock.clone());

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_expectation() {
        let cache = MemoryCache::new(clock());
        cache.set("k", "v1", Duration::from_secs(60)).await.unwrap();

        assert!(cache
            .compare_and_set("k", "v1", "v2", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!cache
            .compare_and_set("k", "v1", "v3", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!cache
            .compare_and_set("missing", "v1", "v3", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn rolled_back_unit_of_work_leaves_no_trace() {
        let store = MemoryStore::new(clock());
        store
            .create_user(NewUser {
                id: 1,
                first_name: "Ada".into(),
                username: None,
                timezone: "UTC".into(),
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_user_xp_and_streak(
            1,
            UserStatsUpdate {
                xp_delta: 100,
                streak: 1,
                last_lesson_date: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();
        drop(tx);

        let user = store.user(1).await.unwrap();
        assert_eq!(user.xp, 0);
        assert_eq!(user.streak, 0);
    }

    #[tokio::test]
    async fn duplicate_language_name_conflicts() {
        let store = MemoryStore::new(clock());
        let rust = NewLanguage {
            name: "Rust".into(),
            description: String::new(),
            picture: String::new(),
            level: 0,
            popularity: 9,
        };

        store.create_language(rust.clone()).await.unwrap();
        let err = store.create_language(rust).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
