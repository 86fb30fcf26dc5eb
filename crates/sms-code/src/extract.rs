//! Verification code and phone number extraction from free text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Anchor keyword, up to 20 non-digit characters, then a digit run.
///
/// The run is captured whole so its length can be checked. The gap cannot
/// contain digits, so the capture is always a maximal run.
///
/// Digits are ASCII `0-9` only. Full-width (`１２３４５６`) and other
/// Unicode decimal digits are never part of a code; they count as
/// non-digit gap characters.
static CONTEXT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:验证码|auth|code)[^0-9]{0,20}([0-9]+)").expect("valid regex")
});

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

static MOBILE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"1[0-9]{10}").expect("valid regex"));

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 8;

fn is_code_length(run: &str) -> bool {
    let len = run.chars().count();
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len)
}

/// Extract a verification code from a message body.
///
/// Prefers a 4-8 digit run that follows "验证码", "auth" or "code"
/// (case-insensitive) within 20 characters. Otherwise returns the first
/// 4-8 digit run anywhere in the body, which can pick up unrelated numbers.
pub fn extract_code(body: &str) -> Option<String> {
    let contextual = CONTEXT_CODE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|run| is_code_length(run));

    if let Some(code) = contextual {
        return Some(code.to_string());
    }

    DIGIT_RUN
        .find_iter(body)
        .map(|m| m.as_str())
        .find(|run| is_code_length(run))
        .map(str::to_string)
}

/// Extract an 11-digit mobile number (leading `1`) from a sim slot descriptor.
pub fn extract_phone(sim_slot: Option<&str>) -> Option<String> {
    let sim_slot = sim_slot.filter(|s| !s.is_empty())?;
    MOBILE_NUMBER
        .find(sim_slot)
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contextual_chinese_keyword() {
        assert_eq!(
            extract_code("您的验证码是123456，请在5分钟内完成验证。"),
            Some("123456".into())
        );
    }

    #[test]
    fn test_contextual_beats_earlier_digits() {
        // 2024 appears first but the keyword-anchored run wins
        assert_eq!(
            extract_code("Order 2024 shipped. Your code: 837261"),
            Some("837261".into())
        );
    }

    #[test]
    fn test_contextual_case_insensitive() {
        assert_eq!(extract_code("AUTH token 4821 expires soon"), Some("4821".into()));
        assert_eq!(extract_code("Your CODE is 99887766"), Some("99887766".into()));
    }

    #[test]
    fn test_contextual_first_keyword_wins() {
        assert_eq!(
            extract_code("code 1111 then another code 2222"),
            Some("1111".into())
        );
    }

    #[test]
    fn test_contextual_gap_limit() {
        // 21 non-digit characters between keyword and digits
        let body = format!("code{}5555", "x".repeat(21));
        // falls through to the fallback tier, which still finds the run
        assert_eq!(extract_code(&body), Some("5555".into()));

        let body = format!("ref 777777 code{}5555", "x".repeat(21));
        assert_eq!(extract_code(&body), Some("777777".into()));

        let body = format!("ref 777777 code{}5555", "x".repeat(20));
        assert_eq!(extract_code(&body), Some("5555".into()));
    }

    #[test]
    fn test_contextual_skips_overlong_run() {
        // the phone number after the keyword is not a code
        assert_eq!(
            extract_code("code sent to 15012345678, auth 6543"),
            Some("6543".into())
        );
    }

    #[test]
    fn test_fallback_first_run() {
        assert_eq!(extract_code("order total is 98765 dollars"), Some("98765".into()));
        assert_eq!(extract_code("ids 12 3456 7890123"), Some("3456".into()));
    }

    #[test]
    fn test_run_length_bounds() {
        assert_eq!(extract_code("pin 123"), None);
        assert_eq!(extract_code("call 123456789 now"), None);
        assert_eq!(extract_code("call 15012345678"), None);
        assert_eq!(extract_code("12345678"), Some("12345678".into()));
        assert_eq!(extract_code("1234"), Some("1234".into()));
    }

    #[test]
    fn test_full_width_digits_ignored() {
        assert_eq!(extract_code("验证码１２３４５６"), None);
        assert_eq!(extract_code("验证码１２３４５６ ref 7788"), Some("7788".into()));
    }

    #[test]
    fn test_no_code() {
        assert_eq!(extract_code(""), None);
        assert_eq!(extract_code("hello there, no digits"), None);
        assert_eq!(extract_code("验证码已发送"), None);
    }

    #[test]
    fn test_extract_phone() {
        assert_eq!(
            extract_phone(Some("SIM1(15012345678)")),
            Some("15012345678".into())
        );
        assert_eq!(
            extract_phone(Some("SIM2_13800001111_CMCC")),
            Some("13800001111".into())
        );
    }

    #[test]
    fn test_extract_phone_first_match_only() {
        assert_eq!(
            extract_phone(Some("15000000001 / 18600000002")),
            Some("15000000001".into())
        );
    }

    #[test]
    fn test_extract_phone_missing() {
        assert_eq!(extract_phone(None), None);
        assert_eq!(extract_phone(Some("")), None);
        assert_eq!(extract_phone(Some("SIM1")), None);
        assert_eq!(extract_phone(Some("SIM1(25012345678)")), None);
        assert_eq!(extract_phone(Some("SIM1(1501234567)")), None);
    }
}
