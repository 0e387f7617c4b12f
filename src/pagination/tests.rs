//! Tests for pagination module

use super::*;
use crate::http::{HttpResponse, InjectInto, RequestOption};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use test_case::test_case;

fn paginator(definition: PaginatorDefinition) -> Paginator {
    Arc::new(definition).create(Arc::new(json!({"page_size": 2})))
}

fn body(value: Value) -> HttpResponse {
    HttpResponse::new(200, value.to_string())
}

// ============================================================================
// Page Increment
// ============================================================================

#[test]
fn test_page_increment_stops_on_first_empty_page() {
    let mut p = paginator(
        PaginatorDefinition::new(PaginationStrategy::page_increment(1))
            .with_page_token_option(RequestOption::new(InjectInto::RequestParameter, "page")),
    );
    let response = body(json!({}));

    assert_eq!(p.initial_token(), None);
    assert_eq!(p.next_page_token(&response, 3, None).unwrap(), Some(PageToken::Page(2)));
    // a short page keeps going
    assert_eq!(p.next_page_token(&response, 1, None).unwrap(), Some(PageToken::Page(3)));
    assert_eq!(p.next_page_token(&response, 0, None).unwrap(), None);
    assert_eq!(p.pages_read(), 3);
}

#[test_case(0 ; "zero based")]
#[test_case(1 ; "one based")]
fn test_page_increment_origin(start: u64) {
    let mut p = paginator(PaginatorDefinition::new(PaginationStrategy::PageIncrement {
        start_from_page: start,
        page_size: None,
        inject_on_first_request: true,
    }));
    assert_eq!(p.initial_token(), Some(PageToken::Page(start)));
    assert_eq!(
        p.next_page_token(&body(json!([])), 5, None).unwrap(),
        Some(PageToken::Page(start + 1))
    );
}

#[test]
fn test_page_size_is_injected_on_every_request() {
    let p = paginator(
        PaginatorDefinition::new(PaginationStrategy::PageIncrement {
            start_from_page: 1,
            page_size: Some(50),
            inject_on_first_request: false,
        })
        .with_page_token_option(RequestOption::new(InjectInto::RequestParameter, "page"))
        .with_page_size_option(RequestOption::new(InjectInto::RequestParameter, "per_page")),
    );

    let first = p.request_options(None);
    assert_eq!(first.params.get("per_page").map(String::as_str), Some("50"));
    assert!(first.params.get("page").is_none());

    let second = p.request_options(Some(&PageToken::Page(2)));
    assert_eq!(second.params.get("per_page").map(String::as_str), Some("50"));
    assert_eq!(second.params.get("page").map(String::as_str), Some("2"));
}

// ============================================================================
// Offset Increment
// ============================================================================

#[test]
fn test_offset_increment_stops_on_short_page() {
    let mut p = paginator(
        PaginatorDefinition::new(PaginationStrategy::offset(2))
            .with_page_token_option(RequestOption::new(InjectInto::RequestParameter, "offset")),
    );
    let response = body(json!([]));

    assert_eq!(p.next_page_token(&response, 2, None).unwrap(), Some(PageToken::Offset(2)));
    assert_eq!(p.next_page_token(&response, 2, None).unwrap(), Some(PageToken::Offset(4)));
    assert_eq!(p.next_page_token(&response, 1, None).unwrap(), None);

    let options = p.request_options(Some(&PageToken::Offset(4)));
    assert_eq!(options.params.get("offset").map(String::as_str), Some("4"));
}

#[test]
fn test_offset_increment_stops_on_empty_page() {
    let mut p = paginator(PaginatorDefinition::new(PaginationStrategy::offset(10)));
    assert_eq!(p.next_page_token(&body(json!([])), 0, None).unwrap(), None);
}

// ============================================================================
// Cursor From Body
// ============================================================================

#[test]
fn test_cursor_from_body_follows_until_absent() {
    let mut p = paginator(
        PaginatorDefinition::new(
            PaginationStrategy::cursor("{{ response.meta.next_cursor }}").unwrap(),
        )
        .with_page_token_option(RequestOption::new(InjectInto::RequestParameter, "cursor")),
    );

    let page1 = body(json!({"data": [{"id": 1}], "meta": {"next_cursor": "abc"}}));
    let token = p.next_page_token(&page1, 1, Some(&json!({"id": 1}))).unwrap();
    assert_eq!(token, Some(PageToken::Cursor(json!("abc"))));

    let options = p.request_options(token.as_ref());
    assert_eq!(options.params.get("cursor").map(String::as_str), Some("abc"));

    let page2 = body(json!({"data": [{"id": 2}], "meta": {"next_cursor": null}}));
    assert_eq!(p.next_page_token(&page2, 1, None).unwrap(), None);

    let page3 = body(json!({"data": [], "meta": {}}));
    assert_eq!(p.next_page_token(&page3, 0, None).unwrap(), None);

    let page4 = body(json!({"meta": {"next_cursor": ""}}));
    assert_eq!(p.next_page_token(&page4, 0, None).unwrap(), None);
}

#[test]
fn test_cursor_stop_condition() {
    let yaml = r#"
type: CursorPagination
cursor_value: "{{ last_record.id }}"
stop_condition: "{{ not response.has_more }}"
"#;
    let strategy: PaginationStrategy = serde_yaml::from_str(yaml).unwrap();
    let mut p = paginator(PaginatorDefinition::new(strategy));

    let more = body(json!({"data": [{"id": "obj_2"}], "has_more": true}));
    assert_eq!(
        p.next_page_token(&more, 1, Some(&json!({"id": "obj_2"}))).unwrap(),
        Some(PageToken::Cursor(json!("obj_2")))
    );

    let last = body(json!({"data": [{"id": "obj_3"}], "has_more": false}));
    assert_eq!(p.next_page_token(&last, 1, Some(&json!({"id": "obj_3"}))).unwrap(), None);
}

#[test]
fn test_cursor_from_headers() {
    let mut p = paginator(PaginatorDefinition::new(
        PaginationStrategy::cursor("{{ headers['x-next-page'] }}").unwrap(),
    ));
    let response = HttpResponse::new(200, "[]").with_header("X-Next-Page", "3");
    assert_eq!(
        p.next_page_token(&response, 0, None).unwrap(),
        Some(PageToken::Cursor(json!("3")))
    );
}

// ============================================================================
// Header Link
// ============================================================================

#[test]
fn test_header_link_follows_next_url() {
    let mut p = paginator(PaginatorDefinition::new(PaginationStrategy::link_header()));
    let response = HttpResponse::new(200, "[]").with_header(
        "Link",
        r#"<https://api.example.com/items?page=1>; rel="prev", <https://api.example.com/items?page=3>; rel="next""#,
    );

    let token = p.next_page_token(&response, 10, None).unwrap();
    assert_eq!(
        token,
        Some(PageToken::NextUrl("https://api.example.com/items?page=3".to_string()))
    );
    assert_eq!(
        p.request_options(token.as_ref()).path.as_deref(),
        Some("https://api.example.com/items?page=3")
    );

    let last = HttpResponse::new(200, "[]")
        .with_header("Link", r#"<https://api.example.com/items?page=2>; rel="prev""#);
    assert_eq!(p.next_page_token(&last, 10, None).unwrap(), None);
    assert_eq!(p.next_page_token(&HttpResponse::new(200, "[]"), 10, None).unwrap(), None);
}

#[test]
fn test_parse_link_header_with_multiple_rels() {
    let header = r#"<https://x.test/a>; rel="next last""#;
    assert_eq!(
        strategies::parse_link_header(header, "next"),
        Some("https://x.test/a".to_string())
    );
    assert_eq!(strategies::parse_link_header(header, "prev"), None);
}

#[test]
fn test_parse_link_header_keeps_commas_inside_urls() {
    let header = r#"<https://api.test/x?ids=1,2&page=1>; rel="prev", <https://api.test/x?ids=1,2&page=2>; rel="next""#;
    assert_eq!(
        strategies::parse_link_header(header, "next"),
        Some("https://api.test/x?ids=1,2&page=2".to_string())
    );
    assert_eq!(
        strategies::parse_link_header(header, "prev"),
        Some("https://api.test/x?ids=1,2&page=1".to_string())
    );
}

// ============================================================================
// No Pagination / Definitions
// ============================================================================

#[test]
fn test_no_pagination_is_always_done() {
    let mut p = paginator(PaginatorDefinition::default());
    assert_eq!(p.initial_token(), None);
    assert_eq!(p.next_page_token(&body(json!([{"id": 1}])), 1, None).unwrap(), None);
    assert!(p.request_options(None).is_empty());
}

#[test]
fn test_paginators_do_not_share_state() {
    let definition = Arc::new(PaginatorDefinition::new(PaginationStrategy::page_increment(1)));
    let config = Arc::new(json!({}));
    let mut first = definition.create(Arc::clone(&config));
    let response = body(json!([]));
    first.next_page_token(&response, 1, None).unwrap();
    first.next_page_token(&response, 1, None).unwrap();

    let mut second = definition.create(config);
    assert_eq!(
        second.next_page_token(&response, 1, None).unwrap(),
        Some(PageToken::Page(2))
    );
}

#[test]
fn test_path_injection_for_cursor_token() {
    let p = paginator(
        PaginatorDefinition::new(PaginationStrategy::cursor("{{ response.next }}").unwrap())
            .with_page_token_option(RequestOption::new(InjectInto::Path, "")),
    );
    let options = p.request_options(Some(&PageToken::Cursor(json!("/v1/items?after=9"))));
    assert_eq!(options.path.as_deref(), Some("/v1/items?after=9"));
    assert!(options.params.is_empty());
}

#[test]
fn test_token_context() {
    assert_eq!(PageToken::context(None), Value::Null);
    assert_eq!(
        PageToken::context(Some(&PageToken::Page(4))),
        json!({"next_page_token": 4})
    );
}

#[test]
fn test_paginator_definition_deserialize() {
    let yaml = r#"
type: DefaultPaginator
pagination_strategy:
  type: OffsetIncrement
  page_size: 100
page_token_option:
  type: RequestOption
  inject_into: request_parameter
  field_name: offset
page_size_option:
  inject_into: request_parameter
  field_name: limit
"#;
    let definition: PaginatorDefinition = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(definition.strategy, PaginationStrategy::offset(100));
    assert_eq!(
        definition.page_token_option,
        Some(RequestOption::new(InjectInto::RequestParameter, "offset"))
    );

    let none: PaginatorDefinition = serde_yaml::from_str("type: NoPagination").unwrap();
    assert_eq!(none.strategy, PaginationStrategy::NoPagination);
}
