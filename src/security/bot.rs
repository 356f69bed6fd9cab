//! Cheap bot heuristics from header completeness.
//!
//! No fingerprinting: only the presence of ordinary browser headers and a
//! short list of scripting-client User-Agent substrings are inspected.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::http::request::ProxyRequest;

/// Highest score `bot_risk_score` can return.
pub const MAX_RISK_SCORE: u32 = 6;

fn scripted_client_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new("curl|wget|python|httpclient|postman")
            .case_insensitive(true)
            .build()
            .expect("scripted client pattern compiles")
    })
}

/// True when the User-Agent is present and at least `min_len` characters.
pub fn user_agent_plausible(user_agent: &str, min_len: usize) -> bool {
    !user_agent.is_empty() && user_agent.chars().count() >= min_len
}

/// Score in `0..=6`; higher means more bot-like.
///
/// - +2 User-Agent absent or implausibly short
/// - +1 no `Accept-Language`
/// - +1 no `Accept`
/// - +2 User-Agent names a scripting client
pub fn bot_risk_score(req: &ProxyRequest, min_user_agent_len: usize) -> u32 {
    let ua = req.user_agent();
    let mut score = 0;

    if !user_agent_plausible(ua, min_user_agent_len) {
        score += 2;
    }
    if req.header("accept-language").unwrap_or_default().is_empty() {
        score += 1;
    }
    if req.header("accept").unwrap_or_default().is_empty() {
        score += 1;
    }
    if scripted_client_re().is_match(ua) {
        score += 2;
    }

    score
}
