//! Card text sanitizer: HTML/LaTeX/cloze → speakable text (§4.3 Card
//! Sanitizer).
//!
//! Pure string transform, no I/O. The same pipeline backs both
//! [`sanitize_question`] and [`sanitize_answer`]; the two differ only in how
//! they resolve cloze deletions, since a question must hide the answer while
//! the answer text must reveal it.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

static CLOZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{c\d+::(.*?)(?:::.*?)?\}\}").expect("static regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

static LATEX_FRAC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\frac\{([^{}]*)\}\{([^{}]*)\}").expect("static regex"));

static LATEX_SUPERSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\^\{?(\w+)\}?").expect("static regex"));

static LATEX_SUBSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\{?(\w+)\}?").expect("static regex"));

/// Minimum readable length (after sanitization) for [`is_readable`].
const MIN_READABLE_CHARS: usize = 3;

/// Sanitize question text for speech: cloze deletions become the word
/// "blank" (the answer must stay hidden).
#[must_use]
pub fn sanitize_question(raw: &str) -> String {
    let text = replace_cloze(raw, "blank");
    pipeline(&text)
}

/// Sanitize answer text for speech: cloze deletions are replaced with their
/// revealed content.
#[must_use]
pub fn sanitize_answer(raw: &str) -> String {
    let text = CLOZE.replace_all(raw, "$1").into_owned();
    pipeline(&text)
}

/// `true` once `text` has at least [`MIN_READABLE_CHARS`] characters after
/// sanitization — used to decide whether a card side is worth speaking at
/// all.
#[must_use]
pub fn is_readable(text: &str) -> bool {
    sanitize_answer(text).chars().count() >= MIN_READABLE_CHARS
}

fn replace_cloze(raw: &str, placeholder: &str) -> String {
    CLOZE.replace_all(raw, placeholder).into_owned()
}

/// Shared strip-HTML → rewrite-LaTeX → collapse-whitespace pipeline.
fn pipeline(text: &str) -> String {
    let text = strip_html(text);
    let text = rewrite_latex(&text);
    collapse_whitespace(&text)
}

fn strip_html(text: &str) -> String {
    let stripped = HTML_TAG.replace_all(text, " ");
    decode_entities(&stripped)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

/// Rewrite common LaTeX into spoken form: fractions become "A over B",
/// `^2` becomes "squared", `^3` becomes "cubed", other superscripts become
/// "to the power of N", subscripts become "sub N", and a handful of common
/// commands and Greek letters are spelled out.
fn rewrite_latex(text: &str) -> String {
    let text = text.replace("$$", "").replace('$', "");
    let text = LATEX_FRAC.replace_all(&text, "$1 over $2").into_owned();
    let text = rewrite_commands(&text);
    let text = LATEX_SUPERSCRIPT
        .replace_all(&text, |caps: &regex::Captures<'_>| match &caps[1] {
            "2" => " squared".to_owned(),
            "3" => " cubed".to_owned(),
            exp => format!(" to the power of {exp}"),
        })
        .into_owned();
    LATEX_SUBSCRIPT
        .replace_all(&text, |caps: &regex::Captures<'_>| format!(" sub {}", &caps[1]))
        .into_owned()
}

/// Spell out common LaTeX commands and Greek letters.
fn rewrite_commands(text: &str) -> String {
    const REPLACEMENTS: &[(&str, &str)] = &[
        (r"\sqrt", "square root of"),
        (r"\times", "times"),
        (r"\cdot", "times"),
        (r"\div", "divided by"),
        (r"\pm", "plus or minus"),
        (r"\leq", "less than or equal to"),
        (r"\geq", "greater than or equal to"),
        (r"\neq", "not equal to"),
        (r"\infty", "infinity"),
        (r"\alpha", "alpha"),
        (r"\beta", "beta"),
        (r"\gamma", "gamma"),
        (r"\delta", "delta"),
        (r"\theta", "theta"),
        (r"\lambda", "lambda"),
        (r"\mu", "mu"),
        (r"\pi", "pi"),
        (r"\sigma", "sigma"),
        (r"\omega", "omega"),
    ];
    let mut out = text.to_owned();
    for (cmd, spoken) in REPLACEMENTS {
        out = out.replace(cmd, spoken);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_tags() {
        assert_eq!(sanitize_question("<b>Capital</b> of France?"), "Capital of France?");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(sanitize_question("Tom&nbsp;&amp;&nbsp;Jerry"), "Tom & Jerry");
    }

    #[test]
    fn cloze_in_question_becomes_blank() {
        assert_eq!(
            sanitize_question("The capital of France is {{c1::Paris}}."),
            "The capital of France is blank."
        );
    }

    #[test]
    fn cloze_in_answer_is_revealed() {
        assert_eq!(
            sanitize_answer("The capital of France is {{c1::Paris::a city}}."),
            "The capital of France is Paris."
        );
    }

    #[test]
    fn fraction_becomes_spoken_form() {
        assert_eq!(sanitize_answer(r"\frac{1}{2}"), "1 over 2");
    }

    #[test]
    fn squared_and_cubed_are_spelled_out() {
        assert_eq!(sanitize_answer("x^2"), "x squared");
        assert_eq!(sanitize_answer("x^3"), "x cubed");
        assert_eq!(sanitize_answer("x^5"), "x to the power of 5");
    }

    #[test]
    fn greek_letters_are_spelled_out() {
        assert_eq!(sanitize_answer(r"\alpha + \beta"), "alpha + beta");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_question("Capital   of\n\nFrance?"), "Capital of France?");
    }

    #[test]
    fn is_readable_rejects_short_text() {
        assert!(!is_readable("Hi"));
        assert!(is_readable("Paris"));
    }

    #[test]
    fn is_readable_counts_after_sanitization() {
        // All-markup text that sanitizes down to nothing is not readable.
        assert!(!is_readable("<b></b>"));
    }

    #[test]
    fn multiple_cloze_deletions_in_one_card() {
        assert_eq!(
            sanitize_question("{{c1::Paris}} is in {{c2::France}}."),
            "blank is in blank."
        );
    }
}
