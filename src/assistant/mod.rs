use anyhow::Result;
use tracing::debug;

use crate::db::StoreHandle;

/// The text-generation collaborator consumed by the surrounding
/// application. Every call may fail; callers go through the
/// `*_with_fallback` helpers so offline devices and collaborator errors
/// degrade to deterministic static text instead of surfacing.
pub trait Collaborator: Send + Sync {
    fn generate_question(&self, mood: Option<u8>) -> Result<String>;
    fn analyze_response(&self, text: &str) -> Result<String>;
    fn suggest_follow_up(&self, history: &[String]) -> Result<String>;
    fn generate_insights(&self, texts: &[String]) -> Result<String>;
    fn generate_recommendations(&self, texts: &[String]) -> Result<Vec<String>>;
}

/// Seeded into the local question pool on first startup.
pub const FALLBACK_QUESTIONS: &[&str] = &[
    "What is on your mind right now?",
    "What was the best part of your day so far?",
    "Is there something you have been avoiding thinking about?",
    "What would make today feel like a win?",
    "What are you grateful for at this moment?",
    "What drained your energy today, and what restored it?",
];

pub const FALLBACK_ANALYSIS: &str =
    "Your reflection was saved. A full analysis will be added once you're back online.";

pub const FALLBACK_INSIGHT: &str =
    "Not enough connectivity to generate insights yet. Your entries are safe and will be \
     analyzed when the device reconnects.";

pub const FALLBACK_RECOMMENDATIONS: &[&str] = &[
    "Take a short walk and revisit this entry afterwards.",
    "Re-read your last few entries and note anything recurring.",
];

/// Ensures the fallback pool exists. Idempotent: a non-empty pool is
/// never reseeded.
pub fn ensure_question_pool(store: &StoreHandle) -> Result<usize> {
    store.seed_question_pool(FALLBACK_QUESTIONS)
}

/// Deterministic pick from the pool: the same mood always lands on the
/// same prompt, so offline sessions are reproducible.
pub fn fallback_question(store: &StoreHandle, mood: Option<u8>) -> Result<String> {
    let pool = store.question_pool()?;
    if pool.is_empty() {
        return Ok(FALLBACK_QUESTIONS[0].to_string());
    }
    let index = mood.unwrap_or(5) as usize % pool.len();
    Ok(pool[index].clone())
}

pub fn question_with_fallback(
    collaborator: &dyn Collaborator,
    store: &StoreHandle,
    online: bool,
    mood: Option<u8>,
) -> Result<String> {
    if online {
        match collaborator.generate_question(mood) {
            Ok(question) => return Ok(question),
            Err(e) => debug!(error = %e, "question generation failed, using fallback"),
        }
    }
    fallback_question(store, mood)
}

pub fn analysis_with_fallback(
    collaborator: &dyn Collaborator,
    online: bool,
    text: &str,
) -> String {
    if online {
        match collaborator.analyze_response(text) {
            Ok(analysis) => return analysis,
            Err(e) => debug!(error = %e, "analysis failed, using fallback"),
        }
    }
    FALLBACK_ANALYSIS.to_string()
}

pub fn insights_with_fallback(
    collaborator: &dyn Collaborator,
    online: bool,
    texts: &[String],
) -> String {
    if online {
        match collaborator.generate_insights(texts) {
            Ok(insights) => return insights,
            Err(e) => debug!(error = %e, "insight generation failed, using fallback"),
        }
    }
    FALLBACK_INSIGHT.to_string()
}

pub fn recommendations_with_fallback(
    collaborator: &dyn Collaborator,
    online: bool,
    texts: &[String],
) -> Vec<String> {
    if online {
        match collaborator.generate_recommendations(texts) {
            Ok(recs) => return recs,
            Err(e) => debug!(error = %e, "recommendations failed, using fallback"),
        }
    }
    FALLBACK_RECOMMENDATIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn follow_up_with_fallback(
    collaborator: &dyn Collaborator,
    store: &StoreHandle,
    online: bool,
    history: &[String],
) -> Result<String> {
    if online {
        match collaborator.suggest_follow_up(history) {
            Ok(question) => return Ok(question),
            Err(e) => debug!(error = %e, "follow-up failed, using fallback"),
        }
    }
    // Walk the pool by history length so consecutive fallback follow-ups
    // don't repeat the same prompt.
    let pool = store.question_pool()?;
    if pool.is_empty() {
        return Ok(FALLBACK_QUESTIONS[history.len() % FALLBACK_QUESTIONS.len()].to_string());
    }
    Ok(pool[history.len() % pool.len()].clone())
}
