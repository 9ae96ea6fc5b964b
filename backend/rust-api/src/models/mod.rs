pub mod language;
pub mod lesson;
pub mod session;
pub mod user;

pub use language::{CreateLanguageRequest, Language, LanguageResponse};
pub use lesson::{
    ActualLessonResponse, Answer, AnswerResponse, CachedAnswer, CachedQuestion,
    CheckLessonAnswerRequest, CheckLessonAnswerResponse, CreateLessonRequest,
    CreateQuestionRequest, CreateQuestionResponse, Lesson, LessonCacheEntry, LessonSummary,
    NewAnswer, Question, QuestionResponse, StartLessonRequest, StartLessonResponse,
};
pub use session::{AnswerOutcome, LessonResult, LessonSession, SessionStatus};
pub use user::{
    ActiveLanguage, AuthUserRequest, LanguageUpdateRequest, LanguageUpdateResponse, NewProgress,
    NewUser, User, UserAuthResponse, UserProfile, UserProgress, UserStatsUpdate,
};
