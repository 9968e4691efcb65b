use chrono::{Duration, TimeZone, Utc};
use pardus_guard::config::{
    CapsConfig, DuplicatesConfig, EmojiConfig, InvitesConfig, LinksConfig, MentionsConfig,
    RateLimitConfig, SpamConfig,
};
use pardus_guard::ledger::ViolationKind;
use pardus_guard::platform::InboundMessage;
use pardus_guard::spam::SpamDetector;

fn spam_config() -> SpamConfig {
    SpamConfig {
        rate_limit: RateLimitConfig { window_ms: 8_000, max_messages: 5 },
        duplicates: DuplicatesConfig { window_ms: 30_000, max_duplicates: 3 },
        mentions: MentionsConfig {
            max_mentions: 5,
            max_role_mentions: 2,
            allowed_broadcast_user_ids: vec![999],
        },
        links: LinksConfig { max_links: 3, window_ms: 60_000 },
        emoji: EmojiConfig { max_emojis: 15 },
        caps: CapsConfig { enabled: false, min_length: 10, caps_percentage: 70 },
        invites: InvitesConfig { enabled: true, allowed: vec!["discord.gg/ourserver".into()] },
        stretched_ratio: 0.55,
    }
}

fn msg(author_id: u64, content: &str) -> InboundMessage {
    InboundMessage {
        id: 1,
        channel_id: 10,
        author_id,
        author_tag: "user#0".into(),
        content: content.into(),
        ..Default::default()
    }
}

fn kinds(hits: &[pardus_guard::spam::SpamHit]) -> Vec<ViolationKind> {
    hits.iter().map(|h| h.kind).collect()
}

#[test]
fn sixth_message_in_window_trips_rate_limit() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    for i in 0..5 {
        let hits = detector.evaluate(&msg(1, &format!("msg {i}")), t0 + Duration::seconds(i));
        assert!(!kinds(&hits).contains(&ViolationKind::RateLimit), "message {i} flagged early");
    }
    let hits = detector.evaluate(&msg(1, "msg 5"), t0 + Duration::seconds(5));
    assert!(kinds(&hits).contains(&ViolationKind::RateLimit));
}

#[test]
fn rate_limit_window_slides() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    for i in 0..5 {
        detector.evaluate(&msg(1, &format!("a{i}")), t0 + Duration::seconds(i));
    }
    // 9s later the first messages have left the 8s window
    let hits = detector.evaluate(&msg(1, "later"), t0 + Duration::seconds(13));
    assert!(!kinds(&hits).contains(&ViolationKind::RateLimit));
}

#[test]
fn users_have_independent_rate_limits() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    for i in 0..6 {
        detector.evaluate(&msg(1, &format!("x{i}")), t0);
    }
    let hits = detector.evaluate(&msg(2, "hello there"), t0);
    assert!(!kinds(&hits).contains(&ViolationKind::RateLimit));
}

#[test]
fn third_duplicate_flags() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let h1 = detector.evaluate(&msg(1, "buy my stuff"), t0);
    let h2 = detector.evaluate(&msg(1, "buy my stuff"), t0 + Duration::seconds(5));
    let h3 = detector.evaluate(&msg(1, "buy my stuff"), t0 + Duration::seconds(10));
    assert!(!kinds(&h1).contains(&ViolationKind::Duplicate));
    assert!(!kinds(&h2).contains(&ViolationKind::Duplicate));
    assert!(kinds(&h3).contains(&ViolationKind::Duplicate));
}

#[test]
fn duplicate_detection_survives_case_and_punctuation() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    detector.evaluate(&msg(1, "Buy my stuff"), t0);
    detector.evaluate(&msg(1, "buy my stuff!!!"), t0 + Duration::seconds(5));
    let h3 = detector.evaluate(&msg(1, "BUY MY STUFF"), t0 + Duration::seconds(10));
    assert!(kinds(&h3).contains(&ViolationKind::Duplicate));
}

#[test]
fn broadcast_mention_denied_unless_allowlisted() {
    let detector = SpamDetector::new(spam_config());
    let mut m = msg(1, "hey @everyone");
    m.mentions_everyone = true;
    assert!(kinds(&detector.content_checks(&m)).contains(&ViolationKind::Mention));

    let mut allowed = msg(999, "hey @everyone");
    allowed.mentions_everyone = true;
    assert!(!kinds(&detector.content_checks(&allowed)).contains(&ViolationKind::Mention));
}

#[test]
fn mention_counts_are_enforced() {
    let detector = SpamDetector::new(spam_config());
    let mut m = msg(1, "ping");
    m.user_mentions = 6;
    assert!(kinds(&detector.content_checks(&m)).contains(&ViolationKind::Mention));

    let mut roles = msg(1, "ping");
    roles.role_mentions = 3;
    assert!(kinds(&detector.content_checks(&roles)).contains(&ViolationKind::Mention));

    let mut fine = msg(1, "ping");
    fine.user_mentions = 3;
    fine.role_mentions = 2;
    assert!(detector.content_checks(&fine).is_empty());
}

#[test]
fn link_spam_counts_across_window_and_exempts_gifs() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let h = detector.evaluate(
        &msg(1, "https://a.test/1 https://a.test/2 https://a.test/3 https://a.test/4"),
        t0,
    );
    assert!(kinds(&h).contains(&ViolationKind::Link));

    // GIF hosts do not count against the limit
    let h = detector.evaluate(
        &msg(
            2,
            "https://a.test/1 https://a.test/2 https://a.test/3 https://tenor.com/view/cat",
        ),
        t0,
    );
    assert!(!kinds(&h).contains(&ViolationKind::Link));

    // two messages inside the same window accumulate
    detector.evaluate(&msg(3, "https://a.test/1 https://a.test/2"), t0);
    let h = detector.evaluate(
        &msg(3, "https://a.test/3 https://a.test/4"),
        t0 + Duration::seconds(30),
    );
    assert!(kinds(&h).contains(&ViolationKind::Link));
}

#[test]
fn single_message_link_flood_is_caught_statelessly() {
    let detector = SpamDetector::new(spam_config());
    let h = detector.content_checks(&msg(
        1,
        "https://a.test/1 https://a.test/2 https://a.test/3 https://a.test/4",
    ));
    assert!(kinds(&h).contains(&ViolationKind::Link));

    // GIF hosts stay exempt in the stateless path too
    let h = detector.content_checks(&msg(
        1,
        "https://a.test/1 https://a.test/2 https://a.test/3 https://tenor.com/view/cat",
    ));
    assert!(!kinds(&h).contains(&ViolationKind::Link));
}

#[test]
fn link_flood_is_reported_once_per_message() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let h = detector.evaluate(
        &msg(1, "https://a.test/1 https://a.test/2 https://a.test/3 https://a.test/4"),
        t0,
    );
    let links = kinds(&h).iter().filter(|k| **k == ViolationKind::Link).count();
    assert_eq!(links, 1);
}

#[test]
fn invites_honour_the_allowlist() {
    let detector = SpamDetector::new(spam_config());
    let h = detector.content_checks(&msg(1, "join discord.gg/elsewhere now"));
    assert!(kinds(&h).contains(&ViolationKind::Invite));

    let h = detector.content_checks(&msg(1, "join discord.gg/ourserver now"));
    assert!(!kinds(&h).contains(&ViolationKind::Invite));
}

#[test]
fn emoji_over_the_cap_flags() {
    let detector = SpamDetector::new(spam_config());
    let fine = "🎉".repeat(15);
    assert!(detector.content_checks(&msg(1, &fine)).is_empty());

    let over = "🎉".repeat(16);
    assert!(kinds(&detector.content_checks(&msg(1, &over))).contains(&ViolationKind::Emoji));
}

#[test]
fn custom_emoji_syntax_is_counted() {
    let detector = SpamDetector::new(spam_config());
    let over = "<:pepe:123456789> ".repeat(16);
    assert!(kinds(&detector.content_checks(&msg(1, &over))).contains(&ViolationKind::Emoji));
}

#[test]
fn caps_check_respects_the_enable_switch() {
    let shouty = "THIS IS ABSOLUTELY OUTRAGEOUS BEHAVIOUR";

    let detector = SpamDetector::new(spam_config());
    assert!(!kinds(&detector.content_checks(&msg(1, shouty))).contains(&ViolationKind::Caps));

    let mut cfg = spam_config();
    cfg.caps.enabled = true;
    let detector = SpamDetector::new(cfg);
    assert!(kinds(&detector.content_checks(&msg(1, shouty))).contains(&ViolationKind::Caps));
}

#[test]
fn stretched_text_is_flagged_but_short_text_is_not() {
    let detector = SpamDetector::new(spam_config());
    let h = detector.content_checks(&msg(1, "heeeeellllloooooo"));
    assert!(kinds(&h).contains(&ViolationKind::Stretched));

    // below the minimum normalized length nothing fires
    assert!(detector.content_checks(&msg(1, "hiiii")).is_empty());

    // ordinary prose stays clean
    assert!(detector.content_checks(&msg(1, "good morning all")).is_empty());
}

#[test]
fn repeated_emoji_are_not_stretched_text() {
    let detector = SpamDetector::new(spam_config());
    // a run of identical emoji at the cap is allowed entirely
    let at_cap = "🎉".repeat(15);
    assert!(detector.content_checks(&msg(1, &at_cap)).is_empty());

    // stretched letters still fire
    let h = detector.content_checks(&msg(1, "heeeeellllloooooo"));
    assert!(kinds(&h).contains(&ViolationKind::Stretched));
}

#[test]
fn idle_user_state_is_pruned() {
    let detector = SpamDetector::new(spam_config());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    detector.evaluate(&msg(1, "hello world"), t0);
    assert_eq!(detector.tracked_users(), 1);

    detector.prune_idle(t0 + Duration::seconds(120));
    assert_eq!(detector.tracked_users(), 0);
}
