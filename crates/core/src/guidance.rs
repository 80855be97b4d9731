//! Learning-relevance classification and off-topic guidance.

use crate::learning::Subject;
use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use std::sync::LazyLock;

static LANGUAGE_INDICATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[字词句读音]|语文|识字").expect("valid literacy pattern"));

static MATH_INDICATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[加减等于数字计算]|数学|算").expect("valid arithmetic pattern"));

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d|[零一二三四五六七八九十]").expect("valid numeral pattern"));

const LANGUAGE_DEFLECTIONS: &[&str] = &["不知道", "不会", "随便", "算了"];
const MATH_DEFLECTIONS: &[&str] = &["不算了", "太难了", "不想做"];

/// Highest guidance tier.
pub const MAX_SEVERITY: u8 = 3;

/// Decides whether an utterance relates to a practice subject.
///
/// Literacy is checked before arithmetic, so text matching both is `Language`.
pub fn classify(text: &str) -> Option<Subject> {
    if LANGUAGE_INDICATOR.is_match(text) {
        Some(Subject::Language)
    } else if MATH_INDICATOR.is_match(text) {
        Some(Subject::Math)
    } else {
        None
    }
}

/// Whether a reply to a `subject` prompt fails to engage with it.
pub fn is_off_topic(subject: Subject, text: &str) -> bool {
    match subject {
        Subject::Language => LANGUAGE_DEFLECTIONS.iter().any(|p| text.contains(p)),
        Subject::Math => {
            !NUMERAL.is_match(text) || MATH_DEFLECTIONS.iter().any(|p| text.contains(p))
        }
    }
}

/// Guidance tier for the number of recent misses: `min(3, misses + 1)`.
pub fn severity(recent_misses: usize) -> u8 {
    u8::try_from(recent_misses.saturating_add(1))
        .unwrap_or(MAX_SEVERITY)
        .min(MAX_SEVERITY)
}

fn pool(severity: u8, subject: Subject) -> &'static [&'static str] {
    match (severity, subject) {
        (0 | 1, Subject::Language) => &[
            "这个想法很有趣！不过我们先回答这个问题好吗？",
            "你的回答很有创意！让我们完成这个小练习吧！",
        ],
        (0 | 1, Subject::Math) => &[
            "我可能需要你的帮助来回答这个问题，我们一起试试好吗？",
            "看起来有点难，让我用更简单的方式问一遍",
        ],
        (2, Subject::Language) => &[
            "我来示范一下，这个字读作\"山\"，你来说一遍？",
            "看起来有点难，让我用更简单的方式问一遍",
        ],
        (2, Subject::Math) => &["我来示范一下：1,2,3...答案是3，你来算一下"],
        (_, Subject::Language) => &[
            "我来示范一下，这个字读作\"山\"，你跟我说一遍",
            "我们一起慢慢读：山，山，山。你来重复一下",
        ],
        (_, Subject::Math) => &[
            "我们一起数：1,2,3...答案是3，你来重复一下",
            "我们用手指一起数一数：1,2,3，答案是3，你跟我说一遍",
        ],
    }
}

/// Picks one guidance line uniformly at random from the tier's pool.
pub fn guidance_for<R: Rng>(severity: u8, subject: Subject, rng: &mut R) -> &'static str {
    let lines = pool(severity, subject);
    lines.choose(rng).copied().unwrap_or(lines[0])
}
