//! Keyword and blacklist screening of listing titles.

use crate::models::SkipReason;

/// Outcome of screening one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(SkipReason),
}

/// Screens a title against the session's keyword and blacklist terms.
///
/// Every keyword must appear somewhere in the title, case-insensitively
/// and as a plain substring of the whole title, not per word. Any
/// blacklist term present disqualifies the listing. The keyword check
/// runs first, so the two rejection reasons never overlap. Empty term
/// lists are vacuously satisfied.
pub fn evaluate(title: &str, keywords: &[String], blacklist: &[String]) -> Verdict {
    let haystack = title.to_lowercase();

    let all_keywords = keywords
        .iter()
        .all(|k| haystack.contains(&k.to_lowercase()));
    if !all_keywords {
        return Verdict::Reject(SkipReason::MissingKeyword);
    }

    let any_blacklisted = blacklist
        .iter()
        .any(|b| haystack.contains(&b.to_lowercase()));
    if any_blacklisted {
        return Verdict::Reject(SkipReason::Blacklisted);
    }

    Verdict::Accept
}

pub fn accepts(title: &str, keywords: &[String], blacklist: &[String]) -> bool {
    matches!(evaluate(title, keywords, blacklist), Verdict::Accept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_when_all_keywords_present_and_no_blacklist_hit() {
        let verdict = evaluate(
            "Senior Python Developer",
            &terms(&["python", "developer"]),
            &terms(&["clearance"]),
        );
        assert_eq!(verdict, Verdict::Accept);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(accepts("Java Engineer", &terms(&["java"]), &[]));
        assert!(accepts("java engineer", &terms(&["Java"]), &[]));
    }

    #[test]
    fn substring_matches_cross_word_boundaries() {
        // "Java" the keyword also matches "JavaScript" in the title.
        assert!(accepts("JavaScript Engineer", &terms(&["Java"]), &[]));
    }

    #[test]
    fn missing_any_keyword_rejects() {
        let verdict = evaluate(
            "Junior Python Developer",
            &terms(&["python", "engineer"]),
            &[],
        );
        assert_eq!(verdict, Verdict::Reject(SkipReason::MissingKeyword));
    }

    #[test]
    fn blacklist_hit_rejects_after_keywords_pass() {
        let verdict = evaluate(
            "Senior Python Engineer",
            &terms(&["python", "engineer"]),
            &terms(&["senior"]),
        );
        assert_eq!(verdict, Verdict::Reject(SkipReason::Blacklisted));
    }

    #[test]
    fn keyword_check_runs_before_blacklist() {
        // Title fails both checks; the missing keyword wins.
        let verdict = evaluate(
            "Senior Java Developer",
            &terms(&["python"]),
            &terms(&["senior"]),
        );
        assert_eq!(verdict, Verdict::Reject(SkipReason::MissingKeyword));
    }

    #[test]
    fn empty_term_lists_are_vacuously_satisfied() {
        assert!(accepts("Anything At All", &[], &[]));
    }
}
