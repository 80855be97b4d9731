//! Adaptive Learning State
//!
//! This module tracks how a child is doing across the two practice subjects and
//! moves each subject's difficulty up or down based on the most recent answers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Number of answers kept for the recent-accuracy window.
pub const RECENT_WINDOW: usize = 5;

const RAISE_THRESHOLD: f64 = 0.8;
const LOWER_THRESHOLD: f64 = 0.6;

/// A difficulty level, always within `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: Difficulty = Difficulty(1);
    pub const MAX: Difficulty = Difficulty(3);

    /// Builds a level, clamping out-of-range input into `1..=3`.
    pub fn clamped(level: u8) -> Self {
        Self(level.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// One level harder, saturating at the top.
    pub fn raise(self) -> Self {
        Self::clamped(self.0.saturating_add(1))
    }

    /// One level easier, saturating at the bottom.
    pub fn lower(self) -> Self {
        Self::clamped(self.0.saturating_sub(1))
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(format!("difficulty must be between 1 and 3, got {}", level))
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two practice subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Language,
    Math,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Language => write!(f, "language"),
            Subject::Math => write!(f, "math"),
        }
    }
}

/// The outcome of recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyChange {
    Raised,
    Lowered,
    Unchanged,
}

/// Per-session learning progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningState {
    language_difficulty: Difficulty,
    math_difficulty: Difficulty,
    correct_answers: u32,
    total_questions: u32,
    recent_answers: VecDeque<bool>,
}

impl LearningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn difficulty(&self, subject: Subject) -> Difficulty {
        match subject {
            Subject::Language => self.language_difficulty,
            Subject::Math => self.math_difficulty,
        }
    }

    fn difficulty_mut(&mut self, subject: Subject) -> &mut Difficulty {
        match subject {
            Subject::Language => &mut self.language_difficulty,
            Subject::Math => &mut self.math_difficulty,
        }
    }

    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    pub fn recent_answers(&self) -> impl Iterator<Item = bool> + '_ {
        self.recent_answers.iter().copied()
    }

    /// Overall fraction of correct answers, `0.0` before any answer.
    pub fn accuracy(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            f64::from(self.correct_answers) / f64::from(self.total_questions)
        }
    }

    /// Fraction of correct answers in the recent window, `0.0` when empty.
    pub fn recent_accuracy(&self) -> f64 {
        if self.recent_answers.is_empty() {
            return 0.0;
        }
        let correct = self.recent_answers.iter().filter(|a| **a).count();
        correct as f64 / self.recent_answers.len() as f64
    }

    /// Number of incorrect answers in the recent window.
    pub fn recent_misses(&self) -> usize {
        self.recent_answers.iter().filter(|a| !**a).count()
    }

    /// Records an answer for `subject` and adapts that subject's difficulty.
    ///
    /// The window holds the last [`RECENT_WINDOW`] answers across both subjects;
    /// only the answered subject's difficulty moves.
    pub fn record_answer(&mut self, subject: Subject, correct: bool) -> DifficultyChange {
        self.total_questions = self.total_questions.saturating_add(1);
        if correct {
            self.correct_answers = self.correct_answers.saturating_add(1);
        }

        self.recent_answers.push_back(correct);
        while self.recent_answers.len() > RECENT_WINDOW {
            self.recent_answers.pop_front();
        }

        let recent = self.recent_accuracy();
        let current = self.difficulty(subject);
        let change = if recent >= RAISE_THRESHOLD && current < Difficulty::MAX {
            *self.difficulty_mut(subject) = current.raise();
            DifficultyChange::Raised
        } else if recent < LOWER_THRESHOLD && current > Difficulty::MIN {
            *self.difficulty_mut(subject) = current.lower();
            DifficultyChange::Lowered
        } else {
            DifficultyChange::Unchanged
        };

        if change != DifficultyChange::Unchanged {
            tracing::info!(%subject, ?change, difficulty = %self.difficulty(subject), "Difficulty adjusted");
        }
        change
    }

    /// Restores the initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// A serializable copy with derived accuracies as percentages.
    pub fn snapshot(&self) -> LearningSnapshot {
        LearningSnapshot {
            language_difficulty: self.language_difficulty,
            math_difficulty: self.math_difficulty,
            correct_answers: self.correct_answers,
            total_questions: self.total_questions,
            recent_answers: self.recent_answers.iter().copied().collect(),
            accuracy: percent(self.accuracy()),
            recent_accuracy: percent(self.recent_accuracy()),
        }
    }
}

fn percent(fraction: f64) -> f64 {
    (fraction * 1000.0).round() / 10.0
}

/// Point-in-time view of a [`LearningState`] handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    pub language_difficulty: Difficulty,
    pub math_difficulty: Difficulty,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub recent_answers: Vec<bool>,
    /// Overall accuracy in percent, one decimal.
    pub accuracy: f64,
    /// Recent-window accuracy in percent, one decimal.
    pub recent_accuracy: f64,
}
