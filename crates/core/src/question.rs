//! Practice question generation.
//!
//! Each (subject, difficulty) pair maps to a [`QuestionSpec`] describing the
//! template and the pool values are drawn from. Generation is a pure function of
//! the injected RNG so the arithmetic contracts can be checked exhaustively.

use crate::learning::{Difficulty, Subject};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// The kind of exercise, one per (subject, level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    CharacterRecognition,
    WordRecognition,
    SentenceReading,
    SimpleAdditionSubtraction,
    CarryAddition,
    BorrowSubtraction,
}

/// Where a question's literal values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pool {
    Literals(&'static [&'static str]),
    Range(RangeInclusive<i32>),
}

/// Static description of one difficulty level of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSpec {
    pub subject: Subject,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub template: &'static str,
    pub pool: Pool,
    pub requires_carry: bool,
    pub allow_borrow: bool,
}

const CHARACTERS: &[&str] = &["人", "口", "手", "山", "水", "日", "月"];
const WORDS: &[&str] = &["爸爸", "妈妈", "老师", "同学", "朋友", "家人", "学校"];
const SENTENCES: &[&str] = &["我爱爸爸妈妈", "今天天气很好", "我们一起学习"];

impl QuestionSpec {
    pub fn language(difficulty: Difficulty) -> Self {
        let (kind, template, literals) = match difficulty.level() {
            1 => (
                QuestionKind::CharacterRecognition,
                "这个字读什么？[显示\"{value}\"字]",
                CHARACTERS,
            ),
            2 => (
                QuestionKind::WordRecognition,
                "这个词怎么读？[显示\"{value}\"词]",
                WORDS,
            ),
            _ => (
                QuestionKind::SentenceReading,
                "这句话怎么读？[显示\"{value}\"句]",
                SENTENCES,
            ),
        };
        Self {
            subject: Subject::Language,
            kind,
            difficulty,
            template,
            pool: Pool::Literals(literals),
            requires_carry: false,
            allow_borrow: false,
        }
    }

    pub fn math(difficulty: Difficulty) -> Self {
        let (kind, template, range, requires_carry, allow_borrow) = match difficulty.level() {
            1 => (
                QuestionKind::SimpleAdditionSubtraction,
                "{a}{op}{b}等于几？",
                1..=5,
                false,
                false,
            ),
            2 => (
                QuestionKind::CarryAddition,
                "{a}加{b}等于几？",
                6..=10,
                true,
                false,
            ),
            _ => (
                QuestionKind::BorrowSubtraction,
                "{a}{op}{b}等于几？",
                1..=10,
                false,
                true,
            ),
        };
        Self {
            subject: Subject::Math,
            kind,
            difficulty,
            template,
            pool: Pool::Range(range),
            requires_carry,
            allow_borrow,
        }
    }
}

/// A reading exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageQuestion {
    pub prompt: String,
    pub answer: String,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
}

impl Operator {
    pub fn apply(self, a: i32, b: i32) -> i32 {
        match self {
            Operator::Add => a + b,
            Operator::Subtract => a - b,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
        }
    }
}

/// An arithmetic exercise; `a op b == answer` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathQuestion {
    pub prompt: String,
    pub a: i32,
    pub op: Operator,
    pub b: i32,
    pub answer: i32,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
}

pub fn generate_language_question<R: Rng>(
    difficulty: Difficulty,
    rng: &mut R,
) -> LanguageQuestion {
    let spec = QuestionSpec::language(difficulty);
    let literals = match spec.pool {
        Pool::Literals(literals) => literals,
        Pool::Range(_) => CHARACTERS,
    };
    let value = literals.choose(rng).copied().unwrap_or(CHARACTERS[0]);

    LanguageQuestion {
        prompt: spec.template.replace("{value}", value),
        answer: value.to_string(),
        kind: spec.kind,
        difficulty,
    }
}

pub fn generate_math_question<R: Rng>(difficulty: Difficulty, rng: &mut R) -> MathQuestion {
    let spec = QuestionSpec::math(difficulty);
    let range = match &spec.pool {
        Pool::Range(range) => range.clone(),
        Pool::Literals(_) => 1..=5,
    };
    let random_op = |rng: &mut R| {
        if rng.random_bool(0.5) {
            Operator::Add
        } else {
            Operator::Subtract
        }
    };

    let (a, op, b) = match spec.kind {
        QuestionKind::CarryAddition => {
            // Pick `b` so that the sum always crosses ten.
            let a = rng.random_range(range);
            let low = 11 - a;
            let high = (20 - 2 * a).max(low);
            (a, Operator::Add, rng.random_range(low..=high))
        }
        QuestionKind::BorrowSubtraction => {
            let a = rng.random_range(range);
            let b = rng.random_range(1..=a);
            let op = match random_op(rng) {
                Operator::Subtract if spec.allow_borrow => Operator::Subtract,
                _ => Operator::Add,
            };
            (a, op, b)
        }
        _ => {
            let a = rng.random_range(range.clone());
            let b = rng.random_range(range);
            match random_op(rng) {
                Operator::Subtract if b > a => (b, Operator::Subtract, a),
                op => (a, op, b),
            }
        }
    };

    MathQuestion {
        prompt: spec
            .template
            .replace("{a}", &a.to_string())
            .replace("{op}", &op.to_string())
            .replace("{b}", &b.to_string()),
        a,
        op,
        b,
        answer: op.apply(a, b),
        kind: spec.kind,
        difficulty,
    }
}
