//! Request classification without spending a model call.
//!
//! `classify` is pure and deterministic: regex heuristics over the request
//! text plus the attached metadata. Rules resolve in a fixed order and the
//! first match wins, so a message that both shares a URL and asks for code
//! lands in `web_search`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use url::Url;

use crate::models::request::IncomingRequest;

/// What kind of work a request needs from the model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestCategory {
    SimpleChat,
    ComplexReasoning,
    WebSearch,
    Vision,
    CodeTask,
    StateUpdate,
}

/// Produced once per request, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub category: RequestCategory,
    /// In [0, 1]. Heuristic matches carry fixed per-rule confidences; a
    /// caller-forced category is always 1.0.
    pub confidence: f32,
    /// Whether the request should run the tool loop. Only web searches set
    /// this heuristically.
    pub requires_tools: bool,
    pub has_image: bool,
}

/// Past this many characters a request is assumed to need deeper reasoning.
const COMPLEX_LENGTH_THRESHOLD: usize = 500;

lazy_static! {
    static ref WEB_INTENT: Regex = Regex::new(
        r"(?i)\b(latest|current|today'?s?|right now|breaking|search (the web )?for|look up|google|news|headlines|weather|forecast|price of|stock price|scores?|who won|when (did|does|is)|release date)\b"
    )
    .unwrap();
    static ref STATE_INTENT: Regex = Regex::new(
        r"(?i)\b(add (a |an )?(task|todo|reminder|item)|remind me|mark .{0,40}\b(done|complete|finished)|capture this|save (this|that)|note (this|that) down|update my (goals?|status|priorit(y|ies))|set my status)\b"
    )
    .unwrap();
    static ref CODE_INTENT: Regex = Regex::new(
        r"(?i)(```|\b(write|fix|debug|refactor|review|implement|optimi[sz]e) (a |an |the |this |my |some )?(function|method|class|module|script|bug|code|test|regex|quer(y|ies))\b|\b(rust|python|javascript|typescript|golang|kotlin|swift|sql|bash) (code|function|script|snippet)\b|\b(api endpoint|stack ?trace|compiler? error|segfault|unit test|pull request)\b)"
    )
    .unwrap();
    static ref ANALYSIS_INTENT: Regex = Regex::new(
        r"(?i)\b(analy[sz]e|compare|contrast|pros and cons|trade-?offs?|evaluate|weigh|help me (decide|choose|plan|think through)|step[- ]by[- ]step|strategy for|break down|in depth)\b"
    )
    .unwrap();
}

/// Classify a request. Total: every input maps to exactly one category.
pub fn classify(request: &IncomingRequest) -> ClassificationResult {
    let has_image = request.image.is_some();

    // Rule 1: the caller already decided.
    if let Some(category) = request.category_override {
        return ClassificationResult {
            category,
            confidence: 1.0,
            requires_tools: category == RequestCategory::WebSearch,
            has_image,
        };
    }

    // Rule 2: an image makes it a vision request no matter what the text says.
    if has_image {
        return heuristic(RequestCategory::Vision, 0.95, has_image);
    }

    let text = request.text.as_str();

    // Rule 3: freshness/search phrasing, or a link shared in the text or
    // alongside it as page context.
    let context_has_url = request
        .context
        .as_ref()
        .and_then(|context| context.url.as_deref())
        .map_or(false, |url| !url.trim().is_empty());
    if WEB_INTENT.is_match(text) || contains_url(text) || context_has_url {
        let mut result = heuristic(RequestCategory::WebSearch, 0.8, has_image);
        result.requires_tools = true;
        return result;
    }

    // Rule 4: the user wants durable state touched.
    if STATE_INTENT.is_match(text) {
        return heuristic(RequestCategory::StateUpdate, 0.85, has_image);
    }

    // Rule 5: programming work.
    if CODE_INTENT.is_match(text) {
        return heuristic(RequestCategory::CodeTask, 0.75, has_image);
    }

    // Rule 6: long or explicitly analytical prompts.
    if text.chars().count() > COMPLEX_LENGTH_THRESHOLD || ANALYSIS_INTENT.is_match(text) {
        return heuristic(RequestCategory::ComplexReasoning, 0.7, has_image);
    }

    heuristic(RequestCategory::SimpleChat, 0.6, has_image)
}

fn heuristic(category: RequestCategory, confidence: f32, has_image: bool) -> ClassificationResult {
    ClassificationResult {
        category,
        confidence,
        requires_tools: false,
        has_image,
    }
}

fn contains_url(text: &str) -> bool {
    text.split_whitespace().any(|token| {
        let trimmed = token.trim_matches(|c: char| "()[]<>\"',.".contains(c));
        Url::parse(trimmed)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false)
    })
}
