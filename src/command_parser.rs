//! Command classification for inbound utterances (§4.1 Command Parser).
//!
//! Pure and deterministic: no I/O, no LLM call. Given an utterance and the
//! context it arrived in, classify it as an answer or one of the recognized
//! commands, with a confidence score the orchestrator uses to decide whether
//! to act on it directly or ask for confirmation.

use std::sync::LazyLock;

use regex::Regex;

/// Where in the voice state machine (§4.9) a command is valid. Some command
/// kinds are only meaningful in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseContext {
    Listening,
    Feedback,
}

/// The classified kind of an inbound utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Answer,
    Skip,
    GiveUp,
    Repeat,
    Hint,
    Stop,
    Undo,
    Explain,
    Status,
    Next,
    MarkAgain,
    MarkHard,
    MarkGood,
    MarkEasy,
    ReadAgain,
    Slower,
    Faster,
    Why,
    Disagree,
    Reanswer,
}

/// The result of parsing one utterance.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub confidence: f32,
    pub raw: String,
    pub needs_confirmation: bool,
}

/// Utterances longer than this are always treated as an answer — commands
/// are short, long text is never a command.
const LONG_ANSWER_CHARS: usize = 100;

struct Rule {
    pattern: &'static LazyLock<Regex>,
    kind: CommandKind,
    contexts: &'static [ParseContext],
}

macro_rules! rule {
    ($name:ident, $pat:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pat).expect("static regex is valid"));
    };
}

rule!(RE_SKIP, r"(?i)^\s*skip\s*$");
rule!(RE_GIVE_UP, r"(?i)^\s*(i\s+)?give\s+up\s*$");
rule!(RE_REPEAT, r"(?i)^\s*(please\s+)?repeat( that)?\s*$");
rule!(RE_HINT, r"(?i)^\s*(give me a |can i have a )?hint\s*$");
rule!(RE_STOP, r"(?i)^\s*stop( the session)?\s*$");
rule!(RE_UNDO, r"(?i)^\s*undo( that)?\s*$");
rule!(RE_EXPLAIN, r"(?i)^\s*(can you )?explain( that)?\s*$");
rule!(RE_STATUS, r"(?i)^\s*(status|how am i doing|progress)\s*$");
rule!(RE_NEXT, r"(?i)^\s*next( card)?\s*$");
rule!(RE_MARK_AGAIN, r"(?i)^\s*(mark\s+)?again\s*$");
rule!(RE_MARK_HARD, r"(?i)^\s*(mark\s+)?hard\s*$");
rule!(RE_MARK_GOOD, r"(?i)^\s*(mark\s+)?good\s*$");
rule!(RE_MARK_EASY, r"(?i)^\s*(mark\s+)?easy\s*$");
rule!(RE_READ_AGAIN, r"(?i)^\s*read (that|it) again\s*$");
rule!(RE_SLOWER, r"(?i)^\s*(say it )?slower\s*$");
rule!(RE_FASTER, r"(?i)^\s*(say it )?faster\s*$");
rule!(RE_WHY, r"(?i)^\s*why( is that)?\??\s*$");
rule!(RE_DISAGREE, r"(?i)^\s*(i )?disagree\s*$");
rule!(RE_REANSWER, r"(?i)^\s*let me (try|answer) again\s*$");

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use ParseContext::{Feedback, Listening};
    vec![
        Rule { pattern: &RE_SKIP, kind: CommandKind::Skip, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_GIVE_UP, kind: CommandKind::GiveUp, contexts: &[Listening] },
        Rule { pattern: &RE_REPEAT, kind: CommandKind::Repeat, contexts: &[Listening] },
        Rule { pattern: &RE_HINT, kind: CommandKind::Hint, contexts: &[Listening] },
        Rule { pattern: &RE_STOP, kind: CommandKind::Stop, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_UNDO, kind: CommandKind::Undo, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_EXPLAIN, kind: CommandKind::Explain, contexts: &[Feedback] },
        Rule { pattern: &RE_STATUS, kind: CommandKind::Status, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_NEXT, kind: CommandKind::Next, contexts: &[Feedback] },
        Rule { pattern: &RE_MARK_AGAIN, kind: CommandKind::MarkAgain, contexts: &[Feedback] },
        Rule { pattern: &RE_MARK_HARD, kind: CommandKind::MarkHard, contexts: &[Feedback] },
        Rule { pattern: &RE_MARK_GOOD, kind: CommandKind::MarkGood, contexts: &[Feedback] },
        Rule { pattern: &RE_MARK_EASY, kind: CommandKind::MarkEasy, contexts: &[Feedback] },
        Rule { pattern: &RE_READ_AGAIN, kind: CommandKind::ReadAgain, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_SLOWER, kind: CommandKind::Slower, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_FASTER, kind: CommandKind::Faster, contexts: &[Listening, Feedback] },
        Rule { pattern: &RE_WHY, kind: CommandKind::Why, contexts: &[Feedback] },
        Rule { pattern: &RE_DISAGREE, kind: CommandKind::Disagree, contexts: &[Feedback] },
        Rule { pattern: &RE_REANSWER, kind: CommandKind::Reanswer, contexts: &[Feedback] },
    ]
});

/// Confidence below which the orchestrator should ask for confirmation
/// before acting on a parsed command.
const CONFIRMATION_THRESHOLD: f32 = 0.8;

/// Classify `utterance` given the current context and the STT confidence
/// that produced it. First matching rule wins; no match or text longer than
/// [`LONG_ANSWER_CHARS`] is treated as an answer.
#[must_use]
pub fn parse_command(utterance: &str, context: ParseContext, stt_confidence: f32) -> ParsedCommand {
    let trimmed = utterance.trim();

    if trimmed.chars().count() > LONG_ANSWER_CHARS {
        return answer(trimmed, stt_confidence);
    }

    for rule in RULES.iter() {
        if !rule.contexts.contains(&context) {
            continue;
        }
        if let Some(m) = rule.pattern.find(trimmed) {
            let match_ratio = if trimmed.is_empty() {
                0.0
            } else {
                m.as_str().chars().count() as f32 / trimmed.chars().count() as f32
            };
            let confidence = match_ratio * stt_confidence;
            return ParsedCommand {
                kind: rule.kind,
                confidence,
                raw: trimmed.to_owned(),
                needs_confirmation: confidence < CONFIRMATION_THRESHOLD,
            };
        }
    }

    answer(trimmed, stt_confidence)
}

fn answer(trimmed: &str, stt_confidence: f32) -> ParsedCommand {
    ParsedCommand {
        kind: CommandKind::Answer,
        confidence: stt_confidence,
        raw: trimmed.to_owned(),
        needs_confirmation: stt_confidence < CONFIRMATION_THRESHOLD,
    }
}
