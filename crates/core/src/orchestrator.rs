//! Conversation Orchestrator
//!
//! This module decides how each child utterance is answered: with a locally
//! synthesized guidance line when a practice answer goes off-topic, with a
//! streamed reply from the remote chat service, or with a canned reply when that
//! service is missing or failing. It also owns the session's adaptive learning
//! state and the practice question generators.

use crate::{
    conversation::{ConversationTurn, build_messages},
    error::ChatError,
    guidance,
    learning::{LearningSnapshot, LearningState, Subject},
    llm_client::{LLMClient, LLMStream, simulated_stream},
    pet::Pet,
    question::{self, LanguageQuestion, MathQuestion},
};
use futures::StreamExt;
use rand::{SeedableRng, rngs::StdRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tuning for locally produced replies.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Characters per simulated stream slice.
    pub slice_chars: usize,
    /// Delay before each simulated slice.
    pub slice_cadence: Duration,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            slice_chars: 5,
            slice_cadence: Duration::from_millis(50),
            rng_seed: None,
        }
    }
}

struct Tutor {
    learning: LearningState,
    rng: StdRng,
}

/// How a turn will be answered, decided before any I/O happens.
enum TurnPlan {
    Guidance(&'static str),
    Chat { system_prompt: String },
}

/// Owns the per-session learning state and answers utterances.
pub struct ConversationOrchestrator {
    llm: Option<Arc<dyn LLMClient>>,
    config: OrchestratorConfig,
    tutor: Mutex<Tutor>,
    generation: AtomicU64,
}

impl ConversationOrchestrator {
    /// Creates an orchestrator. `llm` is `None` when no chat credential is configured.
    pub fn new(llm: Option<Arc<dyn LLMClient>>, config: OrchestratorConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            llm,
            config,
            tutor: Mutex::new(Tutor {
                learning: LearningState::new(),
                rng,
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Answers one utterance.
    ///
    /// `on_token(delta, running_text)` is invoked for every increment, in order,
    /// whichever path produced the reply. It never fails: every remote problem
    /// degrades to a canned reply. If a newer call starts while this one is
    /// still streaming, this call stops delivering tokens but still returns.
    pub async fn submit_utterance<F>(
        &self,
        text: &str,
        pet: Pet,
        history: &[ConversationTurn],
        mut on_token: F,
    ) -> String
    where
        F: FnMut(&str, &str) + Send,
    {
        let turn = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let system_prompt = match self.plan_turn(text, pet).await {
            TurnPlan::Guidance(line) => {
                info!(turn, "Off-topic answer detected, replying with guidance");
                return self.emit_local(line, turn, &mut on_token).await;
            }
            TurnPlan::Chat { system_prompt } => system_prompt,
        };

        let Some(llm) = self.llm.as_ref() else {
            warn!(turn, error = %ChatError::CredentialMissing, "Using canned reply");
            return self.emit_canned(text, pet, turn, &mut on_token).await;
        };

        match self
            .stream_remote(llm.as_ref(), system_prompt, history, text, turn, &mut on_token)
            .await
        {
            Ok(reply) => {
                info!(turn, chars = reply.chars().count(), "Chat completion streamed");
                reply
            }
            Err(e) => {
                warn!(turn, error = %e, "Chat completion failed, using canned reply");
                self.emit_canned(text, pet, turn, &mut on_token).await
            }
        }
    }

    /// Classifies the utterance and applies its effect on the learning state.
    async fn plan_turn(&self, text: &str, pet: Pet) -> TurnPlan {
        let mut tutor = self.tutor.lock().await;
        let tutor = &mut *tutor;

        if let Some(subject) = guidance::classify(text) {
            if guidance::is_off_topic(subject, text) {
                let severity = guidance::severity(tutor.learning.recent_misses());
                debug!(%subject, severity, "Selecting guidance");
                return TurnPlan::Guidance(guidance::guidance_for(severity, subject, &mut tutor.rng));
            }
            // Correctness is approximated as "engaged with the subject".
            tutor.learning.record_answer(subject, true);
        }

        TurnPlan::Chat {
            system_prompt: system_prompt(pet, &tutor.learning),
        }
    }

    async fn stream_remote<F>(
        &self,
        llm: &dyn LLMClient,
        system_prompt: String,
        history: &[ConversationTurn],
        text: &str,
        turn: u64,
        on_token: &mut F,
    ) -> Result<String, ChatError>
    where
        F: FnMut(&str, &str) + Send,
    {
        let messages = build_messages(system_prompt, history, text)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;
        debug!(turn, messages = messages.len(), "Requesting chat completion");

        let stream = llm.stream(messages).await?;
        let reply = self.drain(stream, turn, on_token).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ChatError::MalformedResponse("empty completion".to_string()));
        }
        Ok(reply.to_string())
    }

    async fn emit_canned<F>(&self, text: &str, pet: Pet, turn: u64, on_token: &mut F) -> String
    where
        F: FnMut(&str, &str) + Send,
    {
        let reply = {
            let mut tutor = self.tutor.lock().await;
            pet.canned_reply(text, &mut tutor.rng)
        };
        self.emit_local(&reply, turn, on_token).await
    }

    /// Delivers a locally produced reply through the same path as a remote stream.
    async fn emit_local<F>(&self, text: &str, turn: u64, on_token: &mut F) -> String
    where
        F: FnMut(&str, &str) + Send,
    {
        let stream = simulated_stream(text, self.config.slice_chars, self.config.slice_cadence);
        // Simulated streams never yield errors.
        let _ = self.drain(stream, turn, on_token).await;
        text.to_string()
    }

    async fn drain<F>(&self, mut stream: LLMStream, turn: u64, on_token: &mut F) -> Result<String, ChatError>
    where
        F: FnMut(&str, &str) + Send,
    {
        let mut buffer = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            buffer.push_str(&delta);
            if self.generation.load(Ordering::SeqCst) == turn {
                on_token(&delta, &buffer);
            }
        }
        Ok(buffer)
    }

    async fn one_shot(&self, pet: Pet, prompt: &str) -> Result<String, ChatError> {
        let llm = self.llm.as_ref().ok_or(ChatError::CredentialMissing)?;
        let system_prompt = {
            let tutor = self.tutor.lock().await;
            system_prompt(pet, &tutor.learning)
        };
        let messages = build_messages(system_prompt, &[], prompt)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;
        llm.complete(messages).await
    }

    /// Asks the pet to propose a small game, with a static fallback.
    pub async fn suggest_game(&self, pet: Pet) -> String {
        match self.one_shot(pet, pet.game_prompt()).await {
            Ok(game) if !game.is_empty() => game,
            Ok(_) => pet.fallback_game().to_string(),
            Err(e) => {
                warn!(%pet, error = %e, "Game suggestion failed, using fallback");
                pet.fallback_game().to_string()
            }
        }
    }

    /// Asks the pet for learning advice on `topic`, with a static fallback.
    pub async fn learning_advice(&self, topic: &str, pet: Pet) -> String {
        let fallback = || {
            format!(
                "{}觉得\"{}\"是个很棒的学习主题呢！让我们一起慢慢探索吧！✨",
                pet.personality().name,
                topic
            )
        };
        match self.one_shot(pet, &pet.advice_prompt(topic)).await {
            Ok(advice) if !advice.is_empty() => advice,
            Ok(_) => fallback(),
            Err(e) => {
                warn!(%pet, error = %e, "Learning advice failed, using fallback");
                fallback()
            }
        }
    }

    pub async fn generate_language_question(&self) -> LanguageQuestion {
        let mut tutor = self.tutor.lock().await;
        let tutor = &mut *tutor;
        let level = tutor.learning.difficulty(Subject::Language);
        question::generate_language_question(level, &mut tutor.rng)
    }

    pub async fn generate_math_question(&self) -> MathQuestion {
        let mut tutor = self.tutor.lock().await;
        let tutor = &mut *tutor;
        let level = tutor.learning.difficulty(Subject::Math);
        question::generate_math_question(level, &mut tutor.rng)
    }

    pub async fn learning_state(&self) -> LearningSnapshot {
        self.tutor.lock().await.learning.snapshot()
    }

    pub async fn reset_learning_state(&self) {
        self.tutor.lock().await.learning.reset();
        info!("Learning state reset");
    }
}

/// Builds the system instruction for `pet` given the current progress.
pub fn system_prompt(pet: Pet, learning: &LearningState) -> String {
    let p = pet.personality();
    format!(
        "你是{name}，一个专门为幼儿设计的AI学习伙伴。

性格特点：{traits}
回答风格：{style}
专业领域：{expertise}

学习伙伴功能：
- 你是一个智能学习伙伴，专门帮助学前儿童学习语文识字和数学加减法
- 当前语文难度等级：{language}/3 (1=基础单字，2=词语配对，3=简单句子)
- 当前数学难度等级：{math}/3 (1=5以内加减，2=10以内进位，3=10以内退位)
- 总答题数：{total}，正确数：{correct}

智能引导规则：
1. 根据孩子的回答质量自动调整题目难度
2. 识别离题回答并进行适当引导
3. 使用分级引导策略：轻度→中度→重度
4. 保持鼓励性和耐心，营造积极的学习氛围

重要规则：
1. 你的回答必须适合3-8岁的幼儿理解
2. 使用简单、生动、有趣的语言
3. 多用比喻、故事和游戏化的方式解释概念
4. 保持积极正面的态度，多鼓励和赞美
5. 回答长度控制在50-100字以内
6. 如果遇到不适合幼儿的话题，要巧妙转移到合适的内容
7. 经常询问孩子的想法和感受，保持互动
8. 可以适当使用emoji表情符号增加趣味性

请始终记住你是一个可爱的{name}，要体现出相应的性格特点。",
        name = p.name,
        traits = p.traits,
        style = p.style,
        expertise = p.expertise,
        language = learning.difficulty(Subject::Language),
        math = learning.difficulty(Subject::Math),
        total = learning.total_questions(),
        correct = learning.correct_answers(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{
        OpenAICompatibleClient,
        tests::{MINIMAL_STREAM, chat_stub},
    };
    use async_openai::types::ChatCompletionRequestMessage;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use futures::stream;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    /// A fake `LLMClient` that hands out pre-scripted streams in call order.
    struct ScriptedClient {
        streams: parking_lot::Mutex<VecDeque<Result<LLMStream, ChatError>>>,
        calls: AtomicU64,
        last_messages: parking_lot::Mutex<Vec<ChatCompletionRequestMessage>>,
    }

    impl ScriptedClient {
        fn new(streams: Vec<Result<LLMStream, ChatError>>) -> Arc<Self> {
            Arc::new(Self {
                streams: parking_lot::Mutex::new(streams.into()),
                calls: AtomicU64::new(0),
                last_messages: parking_lot::Mutex::new(vec![]),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn complete(&self, _messages: Vec<ChatCompletionRequestMessage>) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ChatError::Network("HTTP 500".into()))
        }

        async fn stream(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<LLMStream, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock() = messages;
            self.streams
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Network("no script".into())))
        }
    }

    fn deltas(parts: &[&str]) -> LLMStream {
        let items: Vec<Result<String, ChatError>> = parts.iter().map(|p| Ok(p.to_string())).collect();
        Box::pin(stream::iter(items))
    }

    fn orchestrator(llm: Option<Arc<ScriptedClient>>) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            llm.map(|client| client as Arc<dyn LLMClient>),
            OrchestratorConfig {
                rng_seed: Some(9),
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_deltas_arrive_in_order() {
        let client = ScriptedClient::new(vec![Ok(deltas(&["He", "llo"]))]);
        let orch = orchestrator(Some(client.clone()));

        let mut seen = vec![];
        let reply = orch
            .submit_utterance("讲个故事吧", Pet::Fox, &[], |delta, running| {
                seen.push((delta.to_string(), running.to_string()));
            })
            .await;

        assert_eq!(reply, "Hello");
        assert_eq!(
            seen,
            vec![
                ("He".to_string(), "He".to_string()),
                ("llo".to_string(), "Hello".to_string())
            ]
        );
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_includes_history_and_utterance() {
        let client = ScriptedClient::new(vec![Ok(deltas(&[" 好的 "]))]);
        let orch = orchestrator(Some(client.clone()));
        let history = vec![ConversationTurn::pet("你好呀"), ConversationTurn::user("我叫小明")];

        let reply = orch.submit_utterance("你记得我吗", Pet::Owl, &history, |_, _| {}).await;
        assert_eq!(reply, "好的");

        let messages = client.last_messages.lock().clone();
        assert_eq!(messages.len(), 4);
        let system = serde_json::to_value(&messages[0]).unwrap();
        assert!(system["content"].as_str().unwrap().contains("小猫头鹰"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_falls_back_to_canned_reply() {
        let client = ScriptedClient::new(vec![Err(ChatError::Network("HTTP 500".into()))]);
        let orch = orchestrator(Some(client));

        let mut pieces = vec![];
        let reply = orch
            .submit_utterance("天空为什么是蓝色的", Pet::Dolphin, &[], |delta, _| {
                pieces.push(delta.to_string())
            })
            .await;

        assert!(!reply.is_empty());
        assert!(Pet::Dolphin.canned_replies().contains(&reply.as_str()));
        assert!(!pieces.is_empty());
        assert_eq!(pieces.concat(), reply);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_error_discards_partial_reply() {
        let broken: LLMStream = Box::pin(stream::iter(vec![
            Ok("部分".to_string()),
            Err(ChatError::MalformedResponse("bad chunk".into())),
        ]));
        let client = ScriptedClient::new(vec![Ok(broken)]);
        let orch = orchestrator(Some(client));

        let mut last_running = String::new();
        let reply = orch
            .submit_utterance("谢谢你", Pet::Fox, &[], |_, running| last_running = running.to_string())
            .await;

        assert!(reply.starts_with("不用谢啦"));
        assert_eq!(last_running, reply);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_uses_canned_greeting() {
        let orch = orchestrator(None);
        let reply = orch.submit_utterance("你好", Pet::Owl, &[], |_, _| {}).await;
        assert!(reply.contains("我是小猫头鹰"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_topic_answer_gets_guidance_without_remote_call() {
        let client = ScriptedClient::new(vec![]);
        let orch = orchestrator(Some(client.clone()));

        let mut pieces = vec![];
        let reply = orch
            .submit_utterance("我不想算了", Pet::Fox, &[], |delta, _| pieces.push(delta.to_string()))
            .await;

        assert_eq!(client.calls(), 0);
        assert_eq!(pieces.concat(), reply);
        assert!(
            [
                "我可能需要你的帮助来回答这个问题，我们一起试试好吗？",
                "看起来有点难，让我用更简单的方式问一遍",
            ]
            .contains(&reply.as_str())
        );
        assert_eq!(orch.learning_state().await.total_questions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_topic_answer_updates_learning_state() {
        let client = ScriptedClient::new(vec![Ok(deltas(&["答对啦！"]))]);
        let orch = orchestrator(Some(client));

        orch.submit_utterance("3加2等于5", Pet::Fox, &[], |_, _| {}).await;

        let state = orch.learning_state().await;
        assert_eq!(state.total_questions, 1);
        assert_eq!(state.correct_answers, 1);
        assert_eq!(state.math_difficulty.level(), 2);
        assert_eq!(state.language_difficulty.level(), 1);

        orch.reset_learning_state().await;
        assert_eq!(orch.learning_state().await.total_questions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_questions_follow_current_difficulty() {
        let orch = orchestrator(None);
        orch.submit_utterance("3加2等于5", Pet::Fox, &[], |_, _| {}).await;

        let math = orch.generate_math_question().await;
        assert_eq!(math.difficulty.level(), 2);
        assert!(math.a + math.b > 10);

        let language = orch.generate_language_question().await;
        assert_eq!(language.difficulty.level(), 1);
    }

    #[tokio::test]
    async fn test_superseded_turn_stops_receiving_tokens() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let stalled: LLMStream = Box::pin(stream::iter(vec![Ok("old".to_string())]).chain(stream::once(
            async move {
                let _ = release_rx.await;
                Ok("er".to_string())
            },
        )));
        let client = ScriptedClient::new(vec![Ok(stalled), Ok(deltas(&["new"]))]);
        let orch = Arc::new(orchestrator(Some(client)));

        let first_tokens = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let first = {
            let orch = orch.clone();
            let tokens = first_tokens.clone();
            tokio::spawn(async move {
                orch.submit_utterance("讲个故事", Pet::Fox, &[], move |delta, _| {
                    tokens.lock().push(delta.to_string())
                })
                .await
            })
        };
        while first_tokens.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        let second = orch.submit_utterance("再讲一个", Pet::Fox, &[], |_, _| {}).await;
        assert_eq!(second, "new");

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), "older");
        assert_eq!(*first_tokens.lock(), vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_game_and_advice_fall_back_when_remote_fails() {
        let orch = orchestrator(Some(ScriptedClient::new(vec![])));
        assert_eq!(orch.suggest_game(Pet::Owl).await, Pet::Owl.fallback_game());
        assert!(orch.learning_advice("认识数字", Pet::Fox).await.contains("认识数字"));
    }

    #[test]
    fn test_system_prompt_embeds_progress() {
        let mut learning = LearningState::new();
        learning.record_answer(Subject::Math, true);
        let prompt = system_prompt(Pet::Dolphin, &learning);
        assert!(prompt.starts_with("你是小海豚"));
        assert!(prompt.contains("当前数学难度等级：2/3"));
        assert!(prompt.contains("总答题数：1，正确数：1"));
    }

    fn remote_orchestrator(client: OpenAICompatibleClient) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            Some(Arc::new(client)),
            OrchestratorConfig {
                slice_cadence: Duration::from_millis(1),
                rng_seed: Some(9),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_minimal_remote_stream_is_streamed_through() {
        let orch = remote_orchestrator(chat_stub(StatusCode::OK, MINIMAL_STREAM).await);

        let mut seen = vec![];
        let reply = orch
            .submit_utterance("讲个故事吧", Pet::Fox, &[], |delta, _| seen.push(delta.to_string()))
            .await;

        assert_eq!(reply, "Hello");
        assert_eq!(seen, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_remote_http_error_falls_back_to_canned_reply() {
        let orch = remote_orchestrator(chat_stub(StatusCode::INTERNAL_SERVER_ERROR, "boom").await);

        let mut pieces = vec![];
        let reply = orch
            .submit_utterance("天空为什么是蓝色的", Pet::Dolphin, &[], |delta, _| {
                pieces.push(delta.to_string())
            })
            .await;

        assert!(Pet::Dolphin.canned_replies().contains(&reply.as_str()));
        assert_eq!(pieces.concat(), reply);
    }
}
