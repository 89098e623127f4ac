//! Grouping scanned messages by sender.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use mailsweep_gmail::Message;
use serde::Serialize;

use crate::unsubscribe::UnsubscribeLink;

/// Group key used for messages without a usable `From` header.
pub const UNKNOWN_SENDER: &str = "(unknown sender)";

/// All matched messages from one sender address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderGroup {
    /// Lowercased `local@domain`, unique within one result set.
    pub sender_email: String,
    /// Display name from the most recent message, if any.
    pub display_name: Option<String>,
    /// Number of messages, always `message_ids.len()`.
    pub count: usize,
    /// Message IDs in this group.
    pub message_ids: BTreeSet<String>,
    /// Oldest receive time seen.
    pub earliest: Option<DateTime<Utc>>,
    /// Newest receive time seen.
    pub latest: Option<DateTime<Utc>>,
    /// Subject of the newest message.
    pub latest_subject: Option<String>,
    /// Unsubscribe target (unsubscribe-scan only).
    pub unsubscribe: Option<UnsubscribeLink>,
}

impl SenderGroup {
    fn new(sender_email: String) -> Self {
        Self {
            sender_email,
            display_name: None,
            count: 0,
            message_ids: BTreeSet::new(),
            earliest: None,
            latest: None,
            latest_subject: None,
            unsubscribe: None,
        }
    }

    fn absorb(&mut self, message: &Message, name: Option<String>, link: Option<UnsubscribeLink>) {
        self.message_ids.insert(message.id.clone());
        self.count = self.message_ids.len();

        let received = message.received_at();
        if let Some(at) = received {
            self.earliest = Some(self.earliest.map_or(at, |e| e.min(at)));
        }
        let is_newest = match (received, self.latest) {
            (Some(at), Some(latest)) => at >= latest,
            (Some(_), None) => true,
            (None, _) => self.latest_subject.is_none(),
        };
        if is_newest {
            if received.is_some() {
                self.latest = received;
            }
            self.latest_subject = message.header("Subject").map(ToString::to_string);
            if name.is_some() {
                self.display_name = name;
            }
        } else if self.display_name.is_none() {
            self.display_name = name;
        }

        // A header link always wins over one scraped from a body.
        match (&self.unsubscribe, link) {
            (None, Some(link)) => self.unsubscribe = Some(link),
            (Some(current), Some(link)) if !current.from_header && link.from_header => {
                self.unsubscribe = Some(link);
            }
            _ => {}
        }
    }
}

/// Splits a `From` header into display name and lowercased address.
#[must_use]
pub fn parse_sender(from: &str) -> (Option<String>, String) {
    let from = from.trim();
    if let Some(open) = from.rfind('<')
        && let Some(close) = from[open..].find('>')
    {
        let address = from[open + 1..open + close].trim().to_lowercase();
        let name = from[..open].trim().trim_matches('"').trim();
        let name = (!name.is_empty()).then(|| name.to_string());
        if !address.is_empty() {
            return (name, address);
        }
    }
    let address = from.trim_matches('"').trim().to_lowercase();
    if address.is_empty() {
        (None, UNKNOWN_SENDER.to_string())
    } else {
        (None, address)
    }
}

/// Accumulates sender groups during one scan pass.
#[derive(Debug, Default)]
pub struct SenderAggregator {
    groups: HashMap<String, SenderGroup>,
    messages: usize,
}

impl SenderAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a successfully fetched message.
    pub fn add(&mut self, message: &Message, link: Option<UnsubscribeLink>) {
        let (name, email) = message
            .header("From")
            .map_or_else(|| (None, UNKNOWN_SENDER.to_string()), parse_sender);
        self.groups
            .entry(email.clone())
            .or_insert_with(|| SenderGroup::new(email))
            .absorb(message, name, link);
        self.messages += 1;
    }

    /// Number of messages added so far.
    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages
    }

    /// Finalizes the groups in result order.
    #[must_use]
    pub fn finish(self) -> Vec<SenderGroup> {
        let mut groups: Vec<SenderGroup> = self.groups.into_values().collect();
        sort_groups(&mut groups);
        groups
    }
}

/// Sorts by descending count, ties by ascending sender address.
pub fn sort_groups(groups: &mut [SenderGroup]) {
    groups.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.sender_email.cmp(&b.sender_email))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailsweep_gmail::{Header, MessagePart};
    use proptest::prelude::*;

    fn message(id: &str, from: &str, millis: i64, subject: &str) -> Message {
        Message {
            id: id.to_string(),
            internal_date: Some(millis.to_string()),
            payload: Some(MessagePart {
                headers: vec![
                    Header {
                        name: "From".into(),
                        value: from.into(),
                    },
                    Header {
                        name: "Subject".into(),
                        value: subject.into(),
                    },
                ],
                ..MessagePart::default()
            }),
            ..Message::default()
        }
    }

    #[test]
    fn test_parse_sender_variants() {
        assert_eq!(
            parse_sender("\"Shop, Inc\" <News@Shop.Example>"),
            (Some("Shop, Inc".into()), "news@shop.example".into())
        );
        assert_eq!(parse_sender("a@B.com"), (None, "a@b.com".into()));
        assert_eq!(parse_sender("<x@y.z>"), (None, "x@y.z".into()));
        assert_eq!(parse_sender("  "), (None, UNKNOWN_SENDER.into()));
    }

    #[test]
    fn test_groups_normalize_case_and_track_dates() {
        let mut agg = SenderAggregator::new();
        agg.add(&message("1", "News <news@shop.example>", 2_000, "second"), None);
        agg.add(&message("2", "NEWS@SHOP.EXAMPLE", 1_000, "first"), None);
        agg.add(&message("2", "news@shop.example", 1_000, "dup"), None);

        let groups = agg.finish();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.sender_email, "news@shop.example");
        assert_eq!(group.count, 2);
        assert_eq!(group.earliest.unwrap().timestamp_millis(), 1_000);
        assert_eq!(group.latest.unwrap().timestamp_millis(), 2_000);
        assert_eq!(group.latest_subject.as_deref(), Some("second"));
        assert_eq!(group.display_name.as_deref(), Some("News"));
    }

    #[test]
    fn test_header_link_replaces_body_link() {
        let body = UnsubscribeLink {
            url: Some("https://a.example/body".into()),
            mailto: None,
            one_click: false,
            from_header: false,
        };
        let header = UnsubscribeLink {
            url: Some("https://a.example/header".into()),
            mailto: None,
            one_click: true,
            from_header: true,
        };
        let mut agg = SenderAggregator::new();
        agg.add(&message("1", "a@a.example", 1, "s"), Some(body));
        agg.add(&message("2", "a@a.example", 2, "s"), Some(header.clone()));
        assert_eq!(agg.finish()[0].unsubscribe, Some(header));
    }

    #[test]
    fn test_sort_fixture() {
        let mut agg = SenderAggregator::new();
        for i in 0..5 {
            agg.add(&message(&format!("b{i}"), "b@x.com", i, "s"), None);
            agg.add(&message(&format!("a{i}"), "a@x.com", i, "s"), None);
        }
        for i in 0..9 {
            agg.add(&message(&format!("c{i}"), "c@x.com", i, "s"), None);
        }
        let order: Vec<String> = agg.finish().into_iter().map(|g| g.sender_email).collect();
        assert_eq!(order, vec!["c@x.com", "a@x.com", "b@x.com"]);
    }

    proptest! {
        #[test]
        fn prop_groups_sorted_by_count_then_email(
            senders in prop::collection::vec(0u8..12, 0..200)
        ) {
            let mut agg = SenderAggregator::new();
            for (i, s) in senders.iter().enumerate() {
                agg.add(&message(&i.to_string(), &format!("s{s}@x.com"), 0, "s"), None);
            }
            let groups = agg.finish();
            prop_assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), senders.len());
            for pair in groups.windows(2) {
                let ordered = pair[0].count > pair[1].count
                    || (pair[0].count == pair[1].count && pair[0].sender_email < pair[1].sender_email);
                prop_assert!(ordered);
            }
        }
    }
}
