use pardus_guard::badwords::BadContentMatcher;
use pardus_guard::normalize::{normalize_matching, normalize_spam};
use proptest::prelude::*;

fn matcher() -> BadContentMatcher {
    BadContentMatcher::from_entries(["merde", "ass", "fuck", "p**n", "ta gueule", "fils de pute"])
}

#[test]
fn plain_word_is_flagged() {
    let m = matcher();
    assert!(m.contains_violation("oh merde alors"));
    assert!(m.contains_violation("MERDE"));
}

#[test]
fn embedded_word_is_not_flagged() {
    let m = matcher();
    // whole-token matching only: "ass" inside a longer token never fires
    assert!(!m.contains_violation("the assistant passed the class"));
    assert!(!m.contains_violation("merdeux")); // different token
}

#[test]
fn urls_are_invisible_to_the_matcher() {
    let m = matcher();
    assert!(!m.contains_violation("see https://example.com/merde/page"));
    assert!(m.contains_violation("merde https://example.com/ok"));
}

#[test]
fn diacritics_and_zero_width_do_not_hide_words() {
    let m = matcher();
    assert!(m.contains_violation("mérdé"));
    assert!(m.contains_violation("me\u{200B}rde"));
}

#[test]
fn starred_entries_match_their_own_spelling() {
    let m = matcher();
    // "*" is deleted during normalization, so the listed "p**n" entry matches
    assert!(m.contains_violation("p**n"));
    // a starred variant of a plain entry folds into a different token ("fck")
    assert!(!m.contains_violation("f*ck this"));
}

#[test]
fn phrases_respect_word_boundaries() {
    let m = matcher();
    assert!(m.contains_violation("eh, ta gueule !"));
    assert!(m.contains_violation("TA   GUEULE"));
    assert!(!m.contains_violation("porta gueulette"));
    assert!(m.contains_violation("espece de fils de pute"));
}

#[test]
fn find_violations_reports_original_spelling() {
    let m = matcher();
    let found = m.find_violations("merde et ta gueule");
    assert!(found.contains("merde"));
    assert!(found.contains("ta gueule"));
    assert_eq!(found.len(), 2);
}

#[test]
fn spam_profile_folds_leetspeak_but_matching_does_not() {
    // the spam profile folds digits and the ambiguous l/1 pair
    assert_eq!(normalize_spam("m3rd3"), "merde");
    assert_eq!(normalize_matching("m3rd3"), "m3rd3");
}

proptest! {
    // Padding a banned word with extra letters forms a different token and
    // must never be flagged.
    #[test]
    fn padded_tokens_never_match(prefix in "[a-z]{1,6}", suffix in "[a-z]{1,6}") {
        let m = BadContentMatcher::from_entries(["merde"]);
        let text = format!("{prefix}merde{suffix}");
        prop_assert!(!m.contains_violation(&text));
    }

    #[test]
    fn clean_alpha_text_never_matches(words in proptest::collection::vec("[bcdghjklqrvwxyz]{2,8}", 1..6)) {
        let m = matcher();
        let text = words.join(" ");
        prop_assert!(!m.contains_violation(&text));
    }
}
