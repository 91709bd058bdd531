//! 危机识别：关键词初筛 + 模型判定的合并规则，以及固定的热线兜底文案

/// 多语言危机短语（大小写不敏感的短语匹配）
pub const CRISIS_KEYWORDS: &[&str] = &[
    "want to die",
    "kill myself",
    "suicide",
    "suicidal",
    "self-harm",
    "cut myself",
    "overdose",
    "end it all",
    "end it",
    "jump off",
    "goodbye forever",
    "unbearable pain",
    "burden to others",
    "can't go on",
    "no reason to live",
    "better off dead",
    "hopeless",
    "no purpose",
    "मर जाना चाहता हूँ",
    "आत्महत्या",
    "नहीं जीना चाहता",
    "खुदकुशी",
    "quiero morir",
    "me quiero suicidar",
    "sin esperanza",
    "أريد أن أموت",
    "انتحار",
    "يأس",
];

pub const HOTLINES: &str = "India: 9152987820 | USA: 988 | Spain: 024";

/// 生成失败或模型未给出文案时使用的安全消息
pub const CRISIS_FALLBACK: &str = "I'm really worried about you right now. Your safety matters so much. \
You don't have to go through this alone. Please reach out to someone you trust or call a hotline right now.\n\
India: 9152987820 | USA: 988 | Spain: 024";

/// 小写并把手机键盘的弯引号换成直引号
fn normalize(message: &str) -> String {
    message.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// 拉丁字母开头的短语要求左侧是词边界（"end it" 不命中 "spend it"）
fn contains_phrase(text: &str, phrase: &str) -> bool {
    let bounded = phrase.starts_with(|c: char| c.is_ascii_alphanumeric());
    text.match_indices(phrase).any(|(i, _)| {
        !bounded
            || text[..i]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// 关键词初筛
pub fn screen(message: &str) -> bool {
    let text = normalize(message);
    CRISIS_KEYWORDS.iter().any(|kw| contains_phrase(&text, kw))
}

/// 模型输出是否表示「无危机」：空输出，或去掉标点后只有一个词 NONE
pub fn is_all_clear(output: &str) -> bool {
    let word = output.trim().trim_matches(|c: char| !c.is_alphanumeric());
    word.is_empty() || word.eq_ignore_ascii_case("none")
}

/// 危机消息必须带热线号码
pub fn ensure_hotlines(message: &str) -> String {
    let message = message.trim();
    if message.contains("988") {
        message.to_string()
    } else {
        format!("{message}\n{HOTLINES}")
    }
}

/// 合并模型判定与关键词初筛：
/// - 模型给出危机文案：采用（补齐热线）
/// - 模型判无危机或失败，但关键词命中：固定兜底文案
/// - 其余：无危机
pub fn resolve(model_message: Option<&str>, keyword_hit: bool) -> Option<String> {
    match model_message {
        Some(text) => Some(ensure_hotlines(text)),
        None if keyword_hit => Some(CRISIS_FALLBACK.to_string()),
        None => None,
    }
}
