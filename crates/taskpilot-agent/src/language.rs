//! Language classification and the translation post-hook.
//!
//! The LLM is prompted in whichever language yields reliable action
//! emission; the user is served in the language their request declared.
//! After the model answers, a cheap deterministic classifier checks the
//! reply's language and, on a mismatch, a single translation-only call
//! rewrites it. Translation failures are swallowed: the user gets the
//! untranslated text and the failure is logged.

use tracing::{debug, warn};

use crate::llm::{ChatMessage, LlmClient, LlmError, LlmRequest};

/// Romanised Urdu tokens that flag a response as Urdu even without
/// Arabic-script characters. Extended (not replaced) by configuration.
const URDU_KEYWORDS: &[&str] = &[
    "shukriya",
    "meherbani",
    "zaroor",
    "theek",
    "acha",
    "nahi",
    "kaam",
    "salam",
    "aap",
    "hogaya",
];

const TRANSLATION_MAX_TOKENS: u32 = 1024;

/// Supported output languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Urdu,
}

impl Language {
    /// Parse a request-level language code. Unknown codes are `None`;
    /// callers fall back to the configured default.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Language::English),
            "ur" | "urdu" => Some(Language::Urdu),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Urdu => "ur",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Urdu => "Urdu",
        }
    }

    /// Static localised text for "the service is temporarily unavailable".
    /// Static because the outage being reported usually is the LLM itself.
    pub fn unavailable_apology(self) -> &'static str {
        match self {
            Language::English => "The service is temporarily unavailable. Please try again.",
            Language::Urdu => "سروس عارضی طور پر دستیاب نہیں ہے۔ براہ کرم دوبارہ کوشش کریں۔",
        }
    }
}

/// Deterministic classify-and-optionally-translate step applied to the
/// final assistant text of a turn.
pub struct LanguagePipeline {
    urdu_keywords: Vec<String>,
}

impl LanguagePipeline {
    /// Build the pipeline; `extra_urdu_keywords` come from configuration.
    pub fn new(extra_urdu_keywords: &[String]) -> Self {
        let mut urdu_keywords: Vec<String> =
            URDU_KEYWORDS.iter().map(|k| k.to_string()).collect();
        for k in extra_urdu_keywords {
            let k = k.trim().to_lowercase();
            if !k.is_empty() && !urdu_keywords.contains(&k) {
                urdu_keywords.push(k);
            }
        }
        Self { urdu_keywords }
    }

    /// Classify `text` by script and keywords. Any Arabic-block character,
    /// or any whole-word keyword hit, classifies as Urdu; otherwise English.
    pub fn classify(&self, text: &str) -> Language {
        if text.chars().any(is_arabic_script) {
            return Language::Urdu;
        }
        let hit = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| {
                let w = w.to_lowercase();
                self.urdu_keywords.iter().any(|k| *k == w)
            });
        if hit {
            Language::Urdu
        } else {
            Language::English
        }
    }

    /// Ensure `text` reads in `target`. On a mismatch, one translation-only
    /// LLM call rewrites it; on any failure the original text survives.
    pub async fn localise(&self, llm: &dyn LlmClient, text: String, target: Language) -> String {
        if target == Language::English || self.classify(&text) == target {
            return text;
        }

        match self.translate(llm, &text, target).await {
            Ok(translated) => {
                // The pre-translation text stays available for debugging.
                debug!(original = %text, "assistant text translated");
                translated
            }
            Err(e) => {
                warn!(error = %e, "translation failed; returning untranslated text");
                text
            }
        }
    }

    async fn translate(
        &self,
        llm: &dyn LlmClient,
        text: &str,
        target: Language,
    ) -> Result<String, LlmError> {
        let req = LlmRequest {
            messages: vec![
                ChatMessage::system(
                    "You translate assistant replies for a task management service.",
                ),
                ChatMessage::user(format!(
                    "Translate the following text to {}. Keep all numbers, task ids, \
                     and code fences exactly as they are. Return only the translation.\n\n{}",
                    target.display_name(),
                    text
                )),
            ],
            temperature: 0.0,
            max_tokens: TRANSLATION_MAX_TOKENS,
        };
        let translated = llm.complete(&req).await?;
        if translated.trim().is_empty() {
            return Err(LlmError::Malformed("empty translation".to_string()));
        }
        Ok(translated)
    }
}

fn is_arabic_script(ch: char) -> bool {
    // Arabic + Arabic Supplement blocks cover Urdu script.
    matches!(ch, '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _req: &LlmRequest) -> Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".to_string())))
        }
    }

    fn pipeline() -> LanguagePipeline {
        LanguagePipeline::new(&[])
    }

    #[test]
    fn language_codes_parse() {
        assert_eq!(Language::parse("en"), Some(Language::English));
        assert_eq!(Language::parse("UR"), Some(Language::Urdu));
        assert_eq!(Language::parse("fr"), None);
    }

    #[test]
    fn urdu_script_classifies_as_urdu() {
        assert_eq!(
            pipeline().classify("ٹاسک بن گیا ہے"),
            Language::Urdu
        );
    }

    #[test]
    fn romanised_keywords_classify_as_urdu() {
        assert_eq!(pipeline().classify("Shukriya! Done."), Language::Urdu);
        assert_eq!(pipeline().classify("theek hai"), Language::Urdu);
    }

    #[test]
    fn plain_english_classifies_as_english() {
        assert_eq!(
            pipeline().classify("Created task #42: Buy milk"),
            Language::English
        );
    }

    #[test]
    fn keyword_match_is_whole_word() {
        // "achaar" contains "acha" but is not the keyword.
        assert_eq!(pipeline().classify("order achaar online"), Language::English);
    }

    #[test]
    fn configured_keywords_extend_the_list() {
        let p = LanguagePipeline::new(&["bilkul".to_string()]);
        assert_eq!(p.classify("Bilkul, done."), Language::Urdu);
    }

    #[tokio::test]
    async fn localise_translates_on_mismatch() {
        let llm = ScriptedLlm {
            replies: Mutex::new(vec![Ok("ٹاسک بن گیا ہے۔".to_string())]),
        };
        let out = pipeline()
            .localise(&llm, "Task created.".to_string(), Language::Urdu)
            .await;
        assert_eq!(out, "ٹاسک بن گیا ہے۔");
    }

    #[tokio::test]
    async fn localise_skips_when_already_target_language() {
        let llm = ScriptedLlm {
            replies: Mutex::new(vec![]),
        };
        let out = pipeline()
            .localise(&llm, "شکریہ".to_string(), Language::Urdu)
            .await;
        assert_eq!(out, "شکریہ");
    }

    #[tokio::test]
    async fn localise_swallows_translation_failure() {
        let llm = ScriptedLlm {
            replies: Mutex::new(vec![Err(LlmError::Unavailable("down".to_string()))]),
        };
        let out = pipeline()
            .localise(&llm, "Task created.".to_string(), Language::Urdu)
            .await;
        assert_eq!(out, "Task created.");
    }

    #[tokio::test]
    async fn english_target_never_translates() {
        let llm = ScriptedLlm {
            replies: Mutex::new(vec![]),
        };
        let out = pipeline()
            .localise(&llm, "anything".to_string(), Language::English)
            .await;
        assert_eq!(out, "anything");
    }
}
