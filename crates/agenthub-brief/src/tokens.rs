//! Token accounting for briefs: one token per four characters, rounded up,
//! and end-trimming truncation that never removes a `#` header line.

pub const DEFAULT_MAX_TOKENS: usize = 2000;

const TRUNCATION_NOTICE: &str = "(brief truncated to fit the token budget)";

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn is_header(line: &str) -> bool {
    line.starts_with('#')
}

/// Trims body lines from the end, one at a time, until the estimate fits the
/// budget, then appends a one-line notice. Header lines always survive, so
/// the floor is the set of headers plus the notice; with a budget below that
/// floor the floor is returned as-is.
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> (String, bool) {
    if estimate_tokens(text) <= max_tokens {
        return (text.to_string(), false);
    }

    let mut lines: Vec<&str> = text.lines().collect();
    loop {
        let joined_len: usize = lines.iter().map(|l| l.chars().count() + 1).sum::<usize>()
            + TRUNCATION_NOTICE.chars().count();
        if joined_len.div_ceil(4) <= max_tokens {
            break;
        }
        match lines.iter().rposition(|l| !is_header(l)) {
            Some(idx) => {
                lines.remove(idx);
            }
            None => break,
        }
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(TRUNCATION_NOTICE);
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        let mut text = String::from("# Tasks\n");
        for i in 0..50 {
            text.push_str(&format!("- task number {} with a fairly long description\n", i));
        }
        text.push_str("# Messages\n");
        for i in 0..50 {
            text.push_str(&format!("- message number {} about the schema change\n", i));
        }
        text
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn under_budget_is_untouched() {
        let text = "# Tasks\n- one";
        let (out, truncated) = truncate_to_budget(text, 100);
        assert_eq!(out, text);
        assert!(!truncated);
    }

    #[test]
    fn truncation_fits_budget_and_keeps_headers() {
        let text = sample();
        let budget = 100;
        let (out, truncated) = truncate_to_budget(&text, budget);
        assert!(truncated);
        assert!(estimate_tokens(&out) <= budget);
        assert!(out.contains("# Tasks"));
        assert!(out.contains("# Messages"));
        assert!(out.ends_with("(brief truncated to fit the token budget)"));
    }

    #[test]
    fn body_is_trimmed_from_the_end() {
        let text = sample();
        let (out, _) = truncate_to_budget(&text, 150);
        // earliest body lines survive the longest
        assert!(out.contains("task number 0"));
        assert!(!out.contains("message number 49"));
    }

    #[test]
    fn tiny_budget_leaves_only_headers_and_notice() {
        let text = sample();
        let (out, truncated) = truncate_to_budget(&text, 1);
        assert!(truncated);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "# Tasks");
        assert_eq!(lines[1], "# Messages");
        assert!(lines[2].starts_with('('));
    }
}
