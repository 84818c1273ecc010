//! Property-based tests for the feed pipeline.
//!
//! Covers ordering stability of the aggregator, conjunction and commutativity
//! of the filter predicates, and monotonicity of pagination.

use proptest::collection::vec;
use proptest::prelude::*;

use practice_feed::feed::filter::apply_predicate;
use practice_feed::{
    aggregate, apply_filters, FeedEntry, FilterState, LogRecord, MemberId, MineMatch, Pagination,
    Predicate, UserSnapshot, ViewerIdentity,
};

const TOKENS: &[&str] = &["2024-01-01-08-00", "2024-01-01-09-30", "2024-01-02-08-00"];
const TAGS: &[&str] = &["piano", "Guitar", "scales", "warmup", "violin"];
const AUTHORS: &[&str] = &["Ada", "Bo", "Cy"];

/// Strategy for one member's logs: (token index, tag indices).
fn logs_strategy() -> impl Strategy<Value = Vec<(usize, Vec<usize>)>> {
    vec((0..TOKENS.len(), vec(0..TAGS.len(), 0..3)), 0..8)
}

fn entries_strategy() -> impl Strategy<Value = Vec<FeedEntry>> {
    vec((0..AUTHORS.len(), 0..TOKENS.len(), vec(0..TAGS.len(), 0..3)), 0..30).prop_map(|rows| {
        rows.into_iter()
            .map(|(author, token, tags)| FeedEntry {
                author: AUTHORS[author].to_string(),
                author_id: MemberId::from(format!("u{}", author)),
                log: LogRecord {
                    created_at: TOKENS[token].to_string(),
                    duration_minutes: "30".to_string(),
                    tags: tags.into_iter().map(|t| TAGS[t].to_string()).collect(),
                    description: None,
                },
            })
            .collect()
    })
}

fn filter_strategy() -> impl Strategy<Value = FilterState> {
    (
        prop_oneof![Just(""), Just("gui"), Just("piano, violin"), Just(" SCALES ")],
        prop_oneof![Just(""), Just("a"), Just("bo")],
        any::<bool>(),
    )
        .prop_map(|(tags, user, mine)| FilterState::new().with_tags(tags).with_user(user).only_mine(mine))
}

fn viewer() -> ViewerIdentity {
    ViewerIdentity {
        id: Some(MemberId::from("u0")),
        display_name: Some("Ada".to_string()),
        mine_match: MineMatch::DisplayName,
    }
}

proptest! {
    #[test]
    fn prop_equal_timestamps_keep_input_order(members in vec(logs_strategy(), 0..4)) {
        // Descriptions carry the position in the concatenated input.
        let mut position = 0usize;
        let snapshots: Vec<UserSnapshot> = members
            .iter()
            .enumerate()
            .map(|(m, logs)| UserSnapshot {
                author_id: MemberId::from(format!("u{}", m)),
                display_name: format!("Member {}", m),
                logs: logs
                    .iter()
                    .map(|(token, _)| {
                        position += 1;
                        LogRecord {
                            created_at: TOKENS[*token].to_string(),
                            duration_minutes: "10".to_string(),
                            tags: Vec::new(),
                            description: Some(position.to_string()),
                        }
                    })
                    .collect(),
            })
            .collect();

        let feed = aggregate(snapshots.iter());
        prop_assert_eq!(feed.len(), position);

        for pair in feed.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.log.created_at >= b.log.created_at);
            if a.log.created_at == b.log.created_at {
                let pa: usize = a.log.description.as_deref().unwrap().parse().unwrap();
                let pb: usize = b.log.description.as_deref().unwrap().parse().unwrap();
                prop_assert!(pa < pb);
            }
        }
    }

    #[test]
    fn prop_filtered_feed_is_ordered_subset(feed in entries_strategy(), filter in filter_strategy()) {
        let filtered = apply_filters(&feed, &filter, &viewer());

        prop_assert!(filtered.len() <= feed.len());
        let mut rest = feed.iter();
        for entry in &filtered {
            prop_assert!(rest.any(|e| e == entry));
        }
    }

    #[test]
    fn prop_predicates_commute(feed in entries_strategy(), filter in filter_strategy()) {
        let viewer = viewer();
        let expected = apply_filters(&feed, &filter, &viewer);

        let orders = [
            [Predicate::Tag, Predicate::User, Predicate::Mine],
            [Predicate::Tag, Predicate::Mine, Predicate::User],
            [Predicate::User, Predicate::Tag, Predicate::Mine],
            [Predicate::User, Predicate::Mine, Predicate::Tag],
            [Predicate::Mine, Predicate::Tag, Predicate::User],
            [Predicate::Mine, Predicate::User, Predicate::Tag],
        ];
        for order in orders {
            let result = order
                .iter()
                .fold(feed.clone(), |acc, p| apply_predicate(&acc, *p, &filter, &viewer));
            prop_assert_eq!(&result, &expected);
        }
    }

    #[test]
    fn prop_pagination_is_monotonic(total in 0usize..120, page_size in 1usize..25, loads in 0usize..10) {
        let items: Vec<usize> = (0..total).collect();
        let mut pagination = Pagination::new(page_size);
        let mut previous = pagination.visible(&items).len();

        for _ in 0..loads {
            let advanced = pagination.load_more(total);
            pagination.settle();

            let visible = pagination.visible(&items).len();
            prop_assert!(visible >= previous);
            prop_assert!(visible <= total);
            prop_assert_eq!(pagination.has_more(total), visible < total);
            if !advanced {
                prop_assert_eq!(visible, previous);
            }
            previous = visible;
        }
    }
}
