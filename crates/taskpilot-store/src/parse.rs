//! Natural-text structure extraction for task titles and descriptions.
//!
//! `#hashtag` tokens become tag links and are stripped from the stored
//! text; a trailing `daily`/`weekly`/`monthly` keyword on the title
//! becomes the task's recurrence fields.

use crate::types::RecurrencePattern;

/// Reduce a raw tag to its stored normal form: trim, strip one leading
/// '#', lowercase, collapse internal whitespace to '-'. Returns `None`
/// when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let stripped = raw.trim().trim_start_matches('#');
    let mut out = String::with_capacity(stripped.len());
    let mut last_was_sep = false;
    for ch in stripped.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() {
                last_was_sep = true;
            }
        } else {
            if last_was_sep {
                out.push('-');
                last_was_sep = false;
            }
            out.extend(ch.to_lowercase());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Extract `#tag` tokens from `text`. Returns the text with the tokens
/// removed (whitespace collapsed) and the normalised tag names in order
/// of appearance.
pub fn extract_hashtags(text: &str) -> (String, Vec<String>) {
    let mut tags = Vec::new();
    let mut kept: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        if let Some(body) = word.strip_prefix('#') {
            // Trailing punctuation ("#work," at a sentence end) is not
            // part of the tag.
            let body = body.trim_end_matches(|c: char| !c.is_alphanumeric());
            if !body.is_empty() {
                if let Some(tag) = normalize_tag(body) {
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
                continue;
            }
        }
        kept.push(word);
    }

    (kept.join(" "), tags)
}

/// Split a trailing recurrence keyword off the title.
///
/// "water the plants daily" becomes ("water the plants", Some(Daily)).
/// Only the final word counts; "daily standup notes" is left alone.
pub fn split_trailing_recurrence(title: &str) -> (String, Option<RecurrencePattern>) {
    let trimmed = title.trim();
    let Some((head, last)) = trimmed.rsplit_once(char::is_whitespace) else {
        return (trimmed.to_string(), None);
    };

    let pattern = match last.to_ascii_lowercase().as_str() {
        "daily" => Some(RecurrencePattern::Daily),
        "weekly" => Some(RecurrencePattern::Weekly),
        "monthly" => Some(RecurrencePattern::Monthly),
        _ => None,
    };

    match pattern {
        Some(p) => (head.trim_end().to_string(), Some(p)),
        None => (trimmed.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_hash_and_lowercases() {
        assert_eq!(normalize_tag("#Work").as_deref(), Some("work"));
        assert_eq!(normalize_tag("  Deep Work  ").as_deref(), Some("deep-work"));
        assert_eq!(normalize_tag("##"), None);
        assert_eq!(normalize_tag("   "), None);
    }

    #[test]
    fn hashtags_are_extracted_and_stripped() {
        let (clean, tags) = extract_hashtags("buy milk #errands #Home today");
        assert_eq!(clean, "buy milk today");
        assert_eq!(tags, vec!["errands", "home"]);
    }

    #[test]
    fn hashtag_trailing_punctuation_is_dropped() {
        let (clean, tags) = extract_hashtags("file taxes #finance, then relax");
        assert_eq!(clean, "file taxes then relax");
        assert_eq!(tags, vec!["finance"]);
    }

    #[test]
    fn duplicate_hashtags_collapse() {
        let (_, tags) = extract_hashtags("a #x b #X c");
        assert_eq!(tags, vec!["x"]);
    }

    #[test]
    fn no_hashtags_leaves_text_alone() {
        let (clean, tags) = extract_hashtags("plain title");
        assert_eq!(clean, "plain title");
        assert!(tags.is_empty());
    }

    #[test]
    fn trailing_daily_becomes_recurrence() {
        let (title, rec) = split_trailing_recurrence("water the plants daily");
        assert_eq!(title, "water the plants");
        assert_eq!(rec, Some(RecurrencePattern::Daily));
    }

    #[test]
    fn leading_keyword_is_not_recurrence() {
        let (title, rec) = split_trailing_recurrence("daily standup notes");
        assert_eq!(title, "daily standup notes");
        assert_eq!(rec, None);
    }

    #[test]
    fn single_word_title_is_untouched() {
        let (title, rec) = split_trailing_recurrence("daily");
        assert_eq!(title, "daily");
        assert_eq!(rec, None);
    }

    #[test]
    fn weekly_and_monthly_are_recognised() {
        assert_eq!(
            split_trailing_recurrence("pay rent monthly").1,
            Some(RecurrencePattern::Monthly)
        );
        assert_eq!(
            split_trailing_recurrence("review goals WEEKLY").1,
            Some(RecurrencePattern::Weekly)
        );
    }
}
