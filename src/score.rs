//! Freshness/relevance score.
//!
//! score = (clamp(credibility, 0, 100) + keyword_boost + social) * decay, capped to [0, 1000]
//!
//! - decay halves every `half_life_hours` (48h by default); future timestamps don't decay.
//! - keyword boost: 2.5 per whole-word, case-insensitive hit in title + summary.
//! - social: likes*0.5 + comments*0.7 + views*0.01.
//!
//! Everything here is pure; callers pass `now`.

use chrono::{DateTime, Utc};
use regex::Regex;

pub const DEFAULT_HALF_LIFE_HOURS: f64 = 48.0;
pub const MAX_SCORE: f64 = 1000.0;
const KEYWORD_HIT_WEIGHT: f64 = 2.5;

/// Inputs the scorer needs; borrowed from an item or a scoring row.
#[derive(Clone, Copy, Debug)]
pub struct ScoreInputs<'a> {
    pub published_at: DateTime<Utc>,
    pub credibility: f64,
    pub title: &'a str,
    pub summary: Option<&'a str>,
    pub likes: u64,
    pub comments: u64,
    pub views: u64,
}

/// Compiled keyword matchers plus the decay half-life.
#[derive(Clone, Debug)]
pub struct Scorer {
    keywords: Vec<Regex>,
    half_life_hours: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            half_life_hours: DEFAULT_HALF_LIFE_HOURS,
        }
    }
}

impl Scorer {
    pub fn new<S: AsRef<str>>(keywords: &[S], half_life_hours: f64) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .filter_map(|k| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k)))
                    .map_err(|e| tracing::warn!(keyword = k, error = %e, "bad keyword pattern"))
                    .ok()
            })
            .collect();
        Self {
            keywords,
            half_life_hours: if half_life_hours > 0.0 {
                half_life_hours
            } else {
                DEFAULT_HALF_LIFE_HOURS
            },
        }
    }

    pub fn score(&self, input: &ScoreInputs<'_>, now: DateTime<Utc>) -> f64 {
        let base = input.credibility.clamp(0.0, 100.0);
        let boost = self.keyword_boost(input.title, input.summary);
        let social = social_score(input.likes, input.comments, input.views);
        let decay = decay_factor(input.published_at, now, self.half_life_hours);
        ((base + boost + social) * decay).clamp(0.0, MAX_SCORE)
    }

    pub fn keyword_boost(&self, title: &str, summary: Option<&str>) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        let text = format!("{} {}", title, summary.unwrap_or_default());
        self.keywords
            .iter()
            .map(|re| re.find_iter(&text).count() as f64 * KEYWORD_HIT_WEIGHT)
            .sum()
    }
}

/// Hours since publication, never negative.
pub fn hours_since(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = (now - published_at).num_milliseconds();
    (ms as f64 / 3_600_000.0).max(0.0)
}

pub fn decay_factor(published_at: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let h = hours_since(published_at, now);
    (-std::f64::consts::LN_2 * h / half_life_hours).exp()
}

pub fn social_score(likes: u64, comments: u64, views: u64) -> f64 {
    likes as f64 * 0.5 + comments as f64 * 0.7 + views as f64 * 0.01
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    fn inputs(published_at: DateTime<Utc>) -> ScoreInputs<'static> {
        ScoreInputs {
            published_at,
            credibility: 90.0,
            title: "Model X launched",
            summary: None,
            likes: 0,
            comments: 0,
            views: 0,
        }
    }

    #[test]
    fn fresh_item_scores_its_credibility() {
        let s = Scorer::default().score(&inputs(t0()), t0());
        assert!((s - 90.0).abs() < 1e-9);
    }

    #[test]
    fn score_halves_every_48_hours() {
        let sc = Scorer::default();
        let s0 = sc.score(&inputs(t0()), t0());
        let s48 = sc.score(&inputs(t0()), t0() + Duration::hours(48));
        let s96 = sc.score(&inputs(t0()), t0() + Duration::hours(96));
        assert!((s48 - 45.0).abs() < 1e-6);
        assert!((s96 - 22.5).abs() < 1e-6);
        assert!(s0 >= s48 && s48 >= s96);
    }

    #[test]
    fn future_timestamp_does_not_decay() {
        let s = Scorer::default().score(&inputs(t0() + Duration::hours(5)), t0());
        assert!((s - 90.0).abs() < 1e-9);
    }

    #[test]
    fn credibility_is_clamped() {
        let mut i = inputs(t0());
        i.credibility = 250.0;
        assert!((Scorer::default().score(&i, t0()) - 100.0).abs() < 1e-9);
        i.credibility = -10.0;
        assert_eq!(Scorer::default().score(&i, t0()), 0.0);
    }

    #[test]
    fn keyword_hits_are_whole_word_and_case_insensitive() {
        let sc = Scorer::new(&["llm", "agents"], DEFAULT_HALF_LIFE_HOURS);
        let boost = sc.keyword_boost("LLM agents and more llm", Some("no llms here, Agents!"));
        // llm x2 (llms does not count), agents x2
        assert!((boost - 10.0).abs() < 1e-9);
        assert_eq!(Scorer::new::<&str>(&[], 48.0).keyword_boost("llm", None), 0.0);
    }

    #[test]
    fn social_signal_adds_up() {
        let mut i = inputs(t0());
        i.credibility = 0.0;
        i.likes = 10;
        i.comments = 10;
        i.views = 1000;
        let s = Scorer::default().score(&i, t0());
        assert!((s - (5.0 + 7.0 + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn score_is_capped() {
        let mut i = inputs(t0());
        i.views = 1_000_000;
        assert_eq!(Scorer::default().score(&i, t0()), MAX_SCORE);
    }
}
