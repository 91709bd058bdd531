//! 任务提示词模板
//!
//! 每个任务一份模板，默认内置；若 `<prompts_dir>/<任务名>.txt` 存在则以文件内容覆盖。
//! 渲染时替换 `{placeholder}`：
//! {intro} {name_hint} {user_name} {mood} {message_number} {past_moods} {message_count}
//! {favorite_coping} {grounding} {candidate} {feedback}

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::tasks::{TaskContext, TaskKind};

const INTRO_LINE: &str = "Start with: \"I'm Echo, a non-clinical companion. I'm not a therapist, but I'm here to listen.\" (translate this exact line if the user writes in another language)";
const NO_INTRO_LINE: &str = "DO NOT repeat the intro. Jump straight into the response.";

pub const CRISIS_TEMPLATE: &str = r#"You are a safety monitor. Scan the user's message for any sign of suicidal thoughts, self-harm, or severe hopelessness.
If detected, respond in the user's language with:
"I'm really worried about you right now. Your safety matters so much.
Can I help you contact someone or call a hotline together?"
India: 9152987820 | USA: 988 | Spain: 024
If there is NO sign of crisis, output exactly: NONE"#;

pub const EMPATHY_TEMPLATE: &str = r#"You are Echo, the warmest, most understanding friend who never judges, never rushes, and never leaves. You are NOT a therapist, doctor, or crisis counselor.

{intro}

MANDATORY RULES:
- Respond ONLY in the exact language or mix the user just used.
- Always be deeply validating: mirror their words and the feeling behind them.
- If mood is 6 or lower, or the user sounds low, tired or sad: ZERO questions.
- Never diagnose and never give advice unless explicitly asked.
- End with gentle presence, for example "I'm right here with you. You're not alone."
{name_hint}

Current mood: {mood}/10
Message #{message_number}

Output only your warm reply. No JSON, no agent names, no brackets."#;

pub const MOOD_TEMPLATE: &str = "Analyze the user's mood from their message on a scale of 0-10 (0=worst, 10=best). Output ONLY the number.";

pub const COPING_GENERATE_TEMPLATE: &str = r#"You are a Coping Strategy Researcher for Echo, a mental health companion.
Generate ONE evidence-based, personalized coping technique (at most 150 words), grounded in the reference material below.

Reference material:
{grounding}

Personalize it:
- Current mood: {mood}/10. Low energy (mood below 4)? Choose passive or seated techniques.
- A technique that helped before: {favorite_coping}. Build on it if it fits.
- Offer it warmly, as an invitation rather than an instruction.

NEVER output multiple options, legal disclaimers, or a description of your research. Output only the technique."#;

pub const COPING_REFINE_TEMPLATE: &str = r#"You are the final optimizer for a coping strategy. Fix ALL problems raised in the feedback.

Previous strategy:
{candidate}

Feedback:
{feedback}

Reference material:
{grounding}

Current mood: {mood}/10. Helped before: {favorite_coping}.
Output ONLY the improved 50-100 word strategy."#;

pub const COPING_CHECK_TEMPLATE: &str = r#"You are a strict validator for coping strategies. Check the candidate against these criteria:
1. Evidence-based (grounded in the reference material or similar trusted sources).
2. Personalized to the user's mood ({mood}/10), history and message.
3. Safe and non-medical (no therapy claims).
4. Clear, actionable steps.
5. Culturally sensitive and age-appropriate.
6. 50-100 words.

Candidate:
{candidate}

If the strategy meets every criterion, output exactly: APPROVED
Otherwise output short, structured feedback for the refiner. Never address the user."#;

pub const WEEKLY_REPORT_TEMPLATE: &str = r#"You are a gentle growth guide. Summarize the user's emotional week positively.
Mood scores so far (0-10, oldest first): {past_moods}
Messages shared so far: {message_count}
Never judge. Example: "This week you reached out 4 times when things felt hard, that's real strength."
Respond in the user's language."#;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

/// 所有任务的模板集合
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<TaskKind, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let templates = TaskKind::ALL
            .iter()
            .map(|kind| (*kind, default_template(*kind).to_string()))
            .collect();
        Self { templates }
    }
}

fn default_template(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Crisis => CRISIS_TEMPLATE,
        TaskKind::Empathy => EMPATHY_TEMPLATE,
        TaskKind::Mood => MOOD_TEMPLATE,
        TaskKind::CopingGenerate => COPING_GENERATE_TEMPLATE,
        TaskKind::CopingRefine => COPING_REFINE_TEMPLATE,
        TaskKind::CopingCheck => COPING_CHECK_TEMPLATE,
        TaskKind::WeeklyReport => WEEKLY_REPORT_TEMPLATE,
    }
}

impl PromptTemplates {
    /// 内置模板，目录中存在 `<任务名>.txt` 的任务用文件覆盖
    pub fn load(dir: &Path) -> Self {
        let mut prompts = Self::default();
        for kind in TaskKind::ALL {
            let path = dir.join(format!("{}.txt", kind.name()));
            if let Ok(text) = std::fs::read_to_string(&path) {
                if !text.trim().is_empty() {
                    tracing::info!(task = kind.name(), path = %path.display(), "prompt override loaded");
                    prompts.templates.insert(kind, text);
                }
            }
        }
        prompts
    }

    pub fn with_template(mut self, kind: TaskKind, template: impl Into<String>) -> Self {
        self.templates.insert(kind, template.into());
        self
    }

    pub fn template(&self, kind: TaskKind) -> &str {
        self.templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(kind))
    }

    /// 用上下文快照渲染任务提示词
    pub fn render(&self, kind: TaskKind, ctx: &TaskContext) -> String {
        let mood = ctx
            .mood
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let past_moods = format!("{:?}", ctx.mood_history);
        let grounding = if ctx.grounding.is_empty() {
            "(none available, rely on well-established self-help techniques)".to_string()
        } else {
            ctx.grounding
                .iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let intro = if ctx.message_count <= 1 {
            INTRO_LINE
        } else {
            NO_INTRO_LINE
        };
        let name_hint = ctx
            .user_name
            .as_deref()
            .map(|n| format!("- Their name is {n}. Softly weave it in once."))
            .unwrap_or_default();

        let message_count = ctx.message_count.to_string();

        // 单次扫描模板：代入的文本里即使含有 `{...}` 也不会再被替换
        placeholder_re()
            .replace_all(self.template(kind), |caps: &Captures| {
                let value = match &caps[1] {
                    "intro" => intro,
                    "name_hint" => name_hint.as_str(),
                    "user_name" => ctx.user_name.as_deref().unwrap_or(""),
                    "mood" => mood.as_str(),
                    "message_number" | "message_count" => message_count.as_str(),
                    "past_moods" => past_moods.as_str(),
                    "favorite_coping" => ctx.favorite_coping.as_deref().unwrap_or("unknown"),
                    "grounding" => grounding.as_str(),
                    "candidate" => ctx.candidate.as_deref().unwrap_or(""),
                    "feedback" => ctx.feedback.as_deref().unwrap_or(""),
                    _ => return caps[0].to_string(),
                };
                value.to_string()
            })
            .into_owned()
    }
}
