// Low-level parsing primitives shared by the tag codec and header handling.

const CRLF: &str = "\r\n";

// FWS = ([*WSP CRLF] 1*WSP)  (RFC 5322, §3.2.2)
pub fn strip_fws(input: &str) -> Option<&str> {
    match strip_wsp(input) {
        Some(s) => match s.strip_prefix(CRLF) {
            Some(s) => strip_wsp(s),
            None => Some(s),
        },
        None => input.strip_prefix(CRLF).and_then(strip_wsp),
    }
}

fn strip_wsp(input: &str) -> Option<&str> {
    input
        .strip_prefix(is_wsp)
        .map(|s| s.trim_start_matches(is_wsp))
}

// WSP (RFC 5234, appendix B.1)
pub fn is_wsp(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

pub fn strip_suffix<'a>(s: &'a str, suffix: &str) -> &'a str {
    debug_assert!(s.ends_with(suffix));
    &s[..(s.len() - suffix.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fws_ok() {
        assert_eq!(strip_fws("  x"), Some("x"));
        assert_eq!(strip_fws("\r\n\tx"), Some("x"));
        assert_eq!(strip_fws(" \r\n x"), Some("x"));

        assert_eq!(strip_fws("x"), None);
        assert_eq!(strip_fws("\r\nx"), None);
    }
}
