//! Plain-text extraction from a message body tree.
//!
//! Plain-text leaves always win over HTML ones; both are searched in
//! document order. HTML is reduced to text before cleaning.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::email::{LeafKind, MessagePart};

pub const EXTRACTION_FAILED: &str = "(Email content could not be extracted)";

static SIGNATURE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^--[\s\S]*$",
        r"(?m)^_{2,}[\s\S]*$",
        r"(?mi)Best regards[\s\S]*$",
        r"(?mi)Kind regards[\s\S]*$",
        r"(?mi)Sent from my [\s\S]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("signature pattern"))
    .collect()
});

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style pattern"));
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script pattern"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(nbsp|amp|lt|gt|quot|#39);").expect("entity pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws pattern"));

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub strip_signatures: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            strip_signatures: true,
        }
    }
}

#[cfg(test)]
pub fn extract(body: &MessagePart) -> String {
    extract_with(body, &ExtractOptions::default())
}

pub fn extract_with(body: &MessagePart, options: &ExtractOptions) -> String {
    extract_part(body, options).unwrap_or_else(|| EXTRACTION_FAILED.to_string())
}

/// Direct children first (plain, then HTML), then each child in turn.
fn extract_part(part: &MessagePart, options: &ExtractOptions) -> Option<String> {
    if !part.is_container() {
        return leaf_text(part, options);
    }

    let children = &part.parts;
    if let Some(text) = children
        .iter()
        .filter(|c| is_leaf_of(c, LeafKind::Plain))
        .find_map(|c| leaf_text(c, options))
    {
        return Some(text);
    }

    // Plain text nested ahead of the first HTML sibling is still preferred.
    let first_html = children
        .iter()
        .position(|c| is_leaf_of(c, LeafKind::Html))
        .unwrap_or(children.len());
    if let Some(text) = leading_plain(&children[..first_html], options) {
        return Some(text);
    }

    if let Some(text) = children
        .iter()
        .filter(|c| is_leaf_of(c, LeafKind::Html))
        .find_map(|c| leaf_text(c, options))
    {
        return Some(text);
    }

    children.iter().find_map(|c| extract_part(c, options))
}

/// First usable plain leaf in document order, unless an HTML leaf comes first.
fn leading_plain(parts: &[MessagePart], options: &ExtractOptions) -> Option<String> {
    for part in parts.iter().flat_map(MessagePart::walk) {
        if part.is_container() {
            continue;
        }
        match part.leaf_kind() {
            Some(LeafKind::Plain) => {
                if let Some(text) = leaf_text(part, options) {
                    return Some(text);
                }
            }
            Some(LeafKind::Html) if part.text_body().is_some() => return None,
            _ => {}
        }
    }
    None
}

fn is_leaf_of(part: &MessagePart, kind: LeafKind) -> bool {
    !part.is_container() && part.leaf_kind() == Some(kind) && part.text_body().is_some()
}

fn leaf_text(part: &MessagePart, options: &ExtractOptions) -> Option<String> {
    let raw = part.text_body()?;
    let text = match part.leaf_kind()? {
        LeafKind::Plain => clean_text(raw, options),
        LeafKind::Html => clean_text(&strip_html(raw), options),
    };
    (!text.is_empty()).then_some(text)
}

pub fn clean_text(text: &str, options: &ExtractOptions) -> String {
    let mut cleaned = text.to_string();
    if options.strip_signatures {
        for pattern in SIGNATURE_PATTERNS.iter() {
            cleaned = pattern.replace(&cleaned, "").into_owned();
        }
    }
    cleaned.trim().to_string()
}

pub fn strip_html(html: &str) -> String {
    let text = STYLE_BLOCK.replace_all(html, "");
    let text = SCRIPT_BLOCK.replace_all(&text, "");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &regex::Captures| {
        match &caps[1] {
            "nbsp" => " ",
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        }
        .to_string()
    });
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
