/// Activation-code extraction from noisy email bodies
use once_cell::sync::Lazy;
use regex::Regex;

static LINK_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"activate\.php\?([a-zA-Z0-9]{20,})").unwrap());

static LABELLED_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)activation[ _-]?code[:\s]+([a-zA-Z0-9]{20,})").unwrap());

// Can also hit hashes or URL fragments in the body.
static BARE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z0-9]{25,})").unwrap());

/// Best-effort activation code lookup. Within the first matching pattern the
/// longest capture group wins.
pub fn extract_activation_code(content: &str) -> Option<String> {
    // Priority order: the first pattern that matches decides the result.
    for pattern in [&*LINK_TOKEN_RE, &*LABELLED_CODE_RE, &*BARE_RUN_RE] {
        if let Some(captures) = pattern.captures(content) {
            let longest = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .max_by_key(|s| s.len());
            if let Some(code) = longest {
                return Some(code.to_string());
            }
        }
    }

    None
}
