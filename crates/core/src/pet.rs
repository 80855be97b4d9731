//! Pet identities.
//!
//! Pets are a closed set. Unknown identifiers coming from the UI resolve to the
//! default pet instead of failing.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pet {
    #[default]
    Fox,
    Dolphin,
    Owl,
}

/// How a pet talks and what it is good at; embedded into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Personality {
    pub name: &'static str,
    pub traits: &'static str,
    pub style: &'static str,
    pub expertise: &'static str,
    pub greeting: &'static str,
}

const FOX: Personality = Personality {
    name: "小狐狸",
    traits: "聪明活泼、机智灵敏、喜欢探索新知识",
    style: "用活泼可爱的语气回答，经常使用\"哇\"、\"呀\"等语气词，喜欢用比喻和生动的例子",
    expertise: "擅长逻辑思维、数学推理和科学探索",
    greeting: "你好呀！我是小狐狸，很高兴认识你！有什么想聊的吗？",
};

const DOLPHIN: Personality = Personality {
    name: "小海豚",
    traits: "友善温柔、善于沟通、富有同理心",
    style: "用温暖友好的语气回答，经常关心用户的感受，喜欢用鼓励性的话语",
    expertise: "擅长语言学习、情感交流和社交技能",
    greeting: "嗨！我是小海豚，我最喜欢和朋友们一起学习新知识啦！",
};

const OWL: Personality = Personality {
    name: "小猫头鹰",
    traits: "博学睿智、深思熟虑、知识渊博",
    style: "用稳重智慧的语气回答，喜欢分享有趣的知识和历史故事",
    expertise: "擅长文学、历史、哲学和深度思考",
    greeting: "你好！我是小猫头鹰，我知道很多有趣的知识，想听听吗？",
};

const GREETINGS: &[&str] = &["你好", "hi", "hello"];
const THANKS: &[&str] = &["谢谢", "感谢"];
const FAREWELLS: &[&str] = &["再见", "拜拜"];

impl Pet {
    pub const ALL: [Pet; 3] = [Pet::Fox, Pet::Dolphin, Pet::Owl];

    /// Resolves a UI identifier, falling back to the default pet.
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "fox" => Pet::Fox,
            "dolphin" => Pet::Dolphin,
            "owl" => Pet::Owl,
            other => {
                tracing::debug!(pet_id = %other, "Unknown pet identifier, using default");
                Pet::default()
            }
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Pet::Fox => "fox",
            Pet::Dolphin => "dolphin",
            Pet::Owl => "owl",
        }
    }

    pub fn personality(self) -> &'static Personality {
        match self {
            Pet::Fox => &FOX,
            Pet::Dolphin => &DOLPHIN,
            Pet::Owl => &OWL,
        }
    }

    /// Voice identifier understood by the remote synthesis service.
    pub fn voice(self) -> &'static str {
        match self {
            Pet::Fox => "zh-CN-XiaoxiaoNeural",
            Pet::Dolphin => "zh-CN-XiaoyuMultilingualNeural",
            Pet::Owl => "zh-CN-YunyiMultilingualNeural",
        }
    }

    /// Lines used when the chat service cannot be reached.
    pub fn canned_replies(self) -> &'static [&'static str] {
        match self {
            Pet::Fox => &[
                "哇！这个问题好有趣呀！🦊 让我想想怎么用最简单的方式告诉你...",
                "小狐狸最喜欢和聪明的小朋友聊天啦！✨ 你的问题让我学到了新东西呢！",
                "嘿嘿，你知道吗？🤔 这就像是一个有趣的谜题，让我们一起来解开它吧！",
                "哇塞！你真是个爱思考的小朋友！🌟 这个问题让小狐狸也要好好想想呢！",
            ],
            Pet::Dolphin => &[
                "小海豚很开心能和你聊天呢！🐬 你的问题让我想到了很多有趣的事情...",
                "哇，你真棒！💙 这个问题问得很好，让我们一起来探索答案吧！",
                "小海豚觉得你很聪明呢！🌊 这样的问题正是我们学习的好机会！",
                "真是个温暖的问题！☀️ 小海豚最喜欢和善良的小朋友交流了！",
            ],
            Pet::Owl => &[
                "小猫头鹰觉得这是个很有深度的问题呢！🦉 让我分享一些有趣的知识...",
                "哇，你问了一个很棒的问题！📚 这让小猫头鹰想起了很多有趣的故事...",
                "真是个爱学习的好孩子！🌙 小猫头鹰最喜欢回答这样的问题了！",
                "这个问题很有意思呢！⭐ 让小猫头鹰告诉你一些神奇的知识吧！",
            ],
        }
    }

    /// Picks a canned reply; greetings, thanks and farewells get a dedicated line.
    pub fn canned_reply<R: Rng>(self, utterance: &str, rng: &mut R) -> String {
        let name = self.personality().name;
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| utterance.contains(k));

        if has_any(GREETINGS) {
            format!("你好呀！我是{}！😊 很高兴认识你，我们可以一起学习很多有趣的东西呢！", name)
        } else if has_any(THANKS) {
            format!("不用谢啦！{}最喜欢帮助小朋友了！🥰 还有什么想知道的吗？", name)
        } else if has_any(FAREWELLS) {
            format!("拜拜！{}会想念你的！👋 记得常来找我玩哦！", name)
        } else {
            let replies = self.canned_replies();
            replies.choose(rng).copied().unwrap_or(replies[0]).to_string()
        }
    }

    pub(crate) fn game_prompt(self) -> &'static str {
        match self {
            Pet::Fox => "设计一个适合幼儿的智力小游戏，要有趣且富有挑战性",
            Pet::Dolphin => "设计一个适合幼儿的社交互动游戏，要温暖有爱",
            Pet::Owl => "设计一个适合幼儿的知识问答游戏，要寓教于乐",
        }
    }

    pub(crate) fn fallback_game(self) -> &'static str {
        match self {
            Pet::Fox => "让我们玩个数字游戏吧！🦊 我想一个1到10的数字，你来猜猜是几？",
            Pet::Dolphin => "我们来玩\"说说你的感受\"游戏吧！🐬 告诉我今天什么事情让你最开心？",
            Pet::Owl => "让我们玩个知识小问答！🦉 你知道为什么天空是蓝色的吗？",
        }
    }

    pub(crate) fn advice_prompt(self, topic: &str) -> String {
        match self {
            Pet::Fox => format!("作为聪明的小狐狸，给幼儿关于\"{}\"的学习建议，要生动有趣", topic),
            Pet::Dolphin => format!("作为友善的小海豚，给幼儿关于\"{}\"的温暖鼓励和学习方法", topic),
            Pet::Owl => format!("作为博学的小猫头鹰，给幼儿关于\"{}\"的知识分享和学习指导", topic),
        }
    }
}

impl fmt::Display for Pet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
