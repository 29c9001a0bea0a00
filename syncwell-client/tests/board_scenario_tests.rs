//! End-to-end scenarios for the ticket board against an in-memory service.
//!
//! Tests verify:
//! - A status toggle that fails on the network reverts and is reported
//! - Debounced search input triggers one listing with the last value
//! - Create and delete keep every cached listing consistent

use proptest::prelude::*;
use std::time::Duration;
use syncwell_client::debounce::Debouncer;
use syncwell_client::notifications::{Notification, NotificationAction};
use syncwell_client::search::{SearchFilters, SEARCH_CHANNEL};
use syncwell_client::tag_picker::TagPicker;
use syncwell_client::TicketBoard;
use syncwell_core::{DebounceSettings, ErrorKind, QueryStatus};
use syncwell_test_utils::generators::arb_tag_name;
use syncwell_test_utils::{
    fixtures, ListTicketsParams, MockTicketsApi, TicketCreate, TicketStatus, TicketsPage,
};
use tokio::time::{advance, sleep};

fn board(api: &std::sync::Arc<MockTicketsApi>) -> TicketBoard {
    TicketBoard::new(api.clone(), api.clone())
}

#[tokio::test]
async fn toggle_with_network_failure_reverts_and_reports() {
    let tickets = fixtures::open_tickets(3);
    let target = tickets[1].clone();
    let api = MockTicketsApi::with_gated_writes(tickets);
    let board = board(&api);

    let mut listing = board.watch(ListTicketsParams::default());
    let before = listing
        .wait_for(|s| s.status == QueryStatus::Success)
        .await
        .and_then(|s| s.data)
        .unwrap();

    api.fail_next_write(fixtures::network_error());
    let pending = board.toggle_status(&target);

    let optimistic = listing.current().data.unwrap();
    assert_eq!(
        optimistic.find(target.id).unwrap().status,
        TicketStatus::Done
    );
    assert_eq!(board.pending_writes(), 1);

    api.release_writes(1);
    let err = pending.await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(listing.current().data.unwrap(), before);
    assert_eq!(board.pending_writes(), 0);

    let notification = Notification::from_remote("update ticket", &err);
    assert_eq!(notification.action, Some(NotificationAction::Retry));
    assert_eq!(api.stored_tickets()[1].status, TicketStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn debounced_search_issues_one_listing() {
    let mut tickets = fixtures::open_tickets(2);
    tickets.push(fixtures::ticket("login page broken", TicketStatus::Open));
    let api = MockTicketsApi::new(tickets);
    let board = board(&api);
    let mut filters = SearchFilters::new();

    let (debouncer, mut debounced) =
        Debouncer::new(&DebounceSettings::with_delay(Duration::from_millis(300)));
    for typed in ["l", "lo", "log"] {
        debouncer.notify(SEARCH_CHANNEL, typed.to_string()).unwrap();
        advance(Duration::from_millis(50)).await;
    }

    sleep(Duration::from_millis(100)).await;
    assert!(debounced.try_recv().is_err());

    let value = debounced.recv().await.unwrap();
    assert_eq!(value.value, "log");
    assert!(filters.apply(value));

    let mut listing = board.watch(filters.params());
    let page = listing
        .wait_for(|s| s.status == QueryStatus::Success)
        .await
        .and_then(|s| s.data)
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "login page broken");
    assert_eq!(api.list_calls(), 1);
}

#[tokio::test]
async fn create_and_delete_keep_listings_consistent() {
    let api = MockTicketsApi::new(fixtures::open_tickets(2));
    let board = board(&api);
    let mut all = board.watch(ListTicketsParams::default());
    all.wait_for(|s| s.status == QueryStatus::Success).await.unwrap();

    let created = board
        .create(TicketCreate {
            title: "write docs".to_string(),
            description: None,
            tags: vec!["docs".to_string()],
        })
        .await
        .unwrap();
    let grown = all
        .wait_for(|s| s.data.as_ref().is_some_and(|p: &TicketsPage| p.total == 3))
        .await
        .unwrap();
    assert!(grown.data.unwrap().find(created.id).is_some());

    let mut tags = board.watch_tags(Default::default());
    let tag_list = tags
        .wait_for(|s| s.status == QueryStatus::Success)
        .await
        .and_then(|s| s.data)
        .unwrap();
    let options = TagPicker::new().options(&tag_list, "DO");
    assert_eq!(options.matches.len(), 1);
    assert_eq!(options.creatable, Some("DO".to_string()));

    let pending = board.delete(created.id);
    assert_eq!(all.current().data.unwrap().total, 2);
    pending.await.unwrap();
    let settled = all
        .wait_for(|s| s.status == QueryStatus::Success && !s.is_stale)
        .await
        .unwrap();
    assert!(settled.data.unwrap().find(created.id).is_none());
}

#[tokio::test]
async fn validation_failure_names_field() {
    let api = MockTicketsApi::new(Vec::new());
    let board = board(&api);
    let err = board
        .create(TicketCreate {
            title: "   ".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    let notification = Notification::from_remote("create ticket", &err);
    assert_eq!(notification.title, "Validation failed");
    assert_eq!(notification.field.as_deref(), Some("title"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn filter_changes_always_reset_offset(pages in 1u32..10, tag in arb_tag_name()) {
        let mut filters = SearchFilters::new();
        for _ in 0..pages {
            filters.next_page(u64::MAX);
        }
        prop_assert_eq!(filters.offset(), pages * 20);
        filters.set_tags(vec![tag]);
        prop_assert_eq!(filters.offset(), 0);
        let key = filters.params().query_key();
        prop_assert_eq!(key.param("offset"), None);
    }

    #[test]
    fn picker_never_offers_selected_tags(names in prop::collection::vec(arb_tag_name(), 1..6), query in "[a-z]{0,3}") {
        let tags: Vec<_> = names.iter().map(|n| fixtures::tag(n)).collect();
        let mut picker = TagPicker::new();
        picker.select(tags[0].clone());
        let options = picker.options(&tags, &query);
        prop_assert!(options.matches.iter().all(|t| t.id != tags[0].id));
        if let Some(name) = options.creatable {
            prop_assert!(!tags.iter().any(|t| t.name.eq_ignore_ascii_case(&name)));
        }
    }
}
