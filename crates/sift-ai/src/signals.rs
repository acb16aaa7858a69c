//! Keyword tables driving the heuristic classifier. All entries are lower-case
//! and matched as plain substrings.

pub const HIGH_SIGNALS: &[&str] = &[
    "urgent",
    "asap",
    "today",
    "eod",
    "past due",
    "overdue",
    "invoice",
    "payment",
    "action required",
    "critical",
    "emergency",
    "deadline",
    "immediate",
    "important",
    "escalation",
    "failed",
    "error",
    "alert",
    "attention",
    "blocked",
    "issue",
];

pub const MEDIUM_SIGNALS: &[&str] = &[
    "meeting",
    "schedule",
    "calendar",
    "update",
    "review",
    "follow up",
    "proposal",
    "feedback",
    "question",
    "reminder",
    "discuss",
    "opportunity",
    "invitation",
    "status",
    "request",
    "sync",
    "check-in",
];

pub const POSITIVE_SIGNALS: &[&str] = &[
    "thank",
    "thanks",
    "congratulations",
    "congrats",
    "great job",
    "well done",
    "appreciate",
    "excellent",
    "happy",
    "pleased",
    "welcome",
    "excited",
    "love",
    "wonderful",
    "awesome",
    "good news",
    "glad",
    "bravo",
    "cheers",
    "looking forward",
];

pub const NEGATIVE_SIGNALS: &[&str] = &[
    "complaint",
    "disappointed",
    "frustrated",
    "unacceptable",
    "problem",
    "issue",
    "failed",
    "error",
    "wrong",
    "broken",
    "unhappy",
    "concern",
    "worried",
    "unfortunately",
    "regret",
    "sorry",
    "bug",
    "crash",
    "outage",
    "denied",
    "rejected",
    "cancelled",
    "bad news",
];

pub const PROMO_SIGNALS: &[&str] = &[
    "unsubscribe",
    "sale",
    "discount",
    "offer",
    "promo",
    "deal",
    "limited time",
    "free trial",
    "buy now",
    "shop",
    "coupon",
    "advertisement",
    "newsletter",
    "marketing",
    "exclusive offer",
    "don't miss",
    "act now",
    "% off",
    "save",
];

pub const SOCIAL_SIGNALS: &[&str] = &[
    "shared a post",
    "mentioned you",
    "tagged",
    "friend request",
    "liked your",
    "commented on",
    "invitation to connect",
    "new follower",
    "social",
    "community",
    "group update",
    "event invitation",
    "birthday",
];

pub const UPDATE_SIGNALS: &[&str] = &[
    "notification",
    "alert",
    "confirmation",
    "receipt",
    "order",
    "shipping",
    "delivery",
    "tracking",
    "subscription",
    "account update",
    "password reset",
    "security",
    "verify",
    "verification",
    "automated",
    "no-reply",
    "noreply",
];

pub const MARKETING_SENDERS: &[&str] = &["noreply", "marketing", "promo", "newsletter", "news@"];

pub const SOCIAL_SENDERS: &[&str] = &["facebook", "linkedin", "twitter", "instagram"];

pub const NO_REPLY_SENDERS: &[&str] = &["no-reply", "noreply", "notifications", "alert"];

pub const WEBMAIL_DOMAINS: &[&str] = &["gmail.com", "yahoo.com", "outlook.com", "hotmail.com"];

pub const REPLY_REQUEST_PHRASES: &[&str] = &[
    "please reply",
    "let me know",
    "get back",
    "respond",
    "your thoughts",
    "rsvp",
    "confirm",
];

pub const MEETING_PHRASES: &[&str] = &[
    "meeting",
    "schedule",
    "calendar",
    "call",
    "zoom",
    "teams",
    "google meet",
    "invite",
];

pub const DOCUMENT_PHRASES: &[&str] = &[
    "attached",
    "attachment",
    "document",
    "review",
    "please see",
    "take a look",
    "pdf",
    "spreadsheet",
    "report",
];

pub const FOLLOW_UP_PHRASES: &[&str] = &[
    "follow up",
    "following up",
    "checking in",
    "touching base",
    "just a reminder",
    "circle back",
];

pub fn matches_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

/// Number of distinct phrases present, ignoring repeats.
pub fn count_present(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|phrase| text.contains(**phrase)).count()
}
