use super::*;
use crate::error::Error;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

fn ctx() -> TemplateContext {
    let mut ctx = TemplateContext::with_config(json!({
        "api_key": "sk_test_123",
        "host": "api.example.com",
        "limit": 100,
        "enabled": true,
        "accounts": ["a", "b"],
        "credentials": {"client_id": "my-client"}
    }));
    ctx.set_state(json!({"updated_at": "2024-01-02T00:00:00Z"}));
    ctx.set_slice(json!({"repo_id": "12345"}), json!({"start": "2024-01-01"}));
    ctx
}

#[test]
fn test_simple_substitution() {
    let result = render("Bearer {{ config.api_key }}", &ctx()).unwrap();
    assert_eq!(result, "Bearer sk_test_123");
}

#[test]
fn test_multiple_substitutions() {
    let result = render("https://{{ config.host }}/v1/{{ stream_slice.repo_id }}", &ctx()).unwrap();
    assert_eq!(result, "https://api.example.com/v1/12345");
}

#[test]
fn test_nested_and_subscript_access() {
    let c = ctx();
    assert_eq!(render("{{ config.credentials.client_id }}", &c).unwrap(), "my-client");
    assert_eq!(render("{{ config['credentials']['client_id'] }}", &c).unwrap(), "my-client");
    assert_eq!(render("{{ config.accounts[1] }}", &c).unwrap(), "b");
    assert_eq!(render("{{ config.accounts[-1] }}", &c).unwrap(), "b");
}

#[test]
fn test_slice_parts_are_addressable() {
    let c = ctx();
    assert_eq!(render("{{ stream_partition.repo_id }}", &c).unwrap(), "12345");
    assert_eq!(render("{{ stream_interval.start }}", &c).unwrap(), "2024-01-01");
    assert_eq!(render("{{ stream_slice.start }}", &c).unwrap(), "2024-01-01");
}

#[test]
fn test_undefined_variable_names_the_path() {
    let result = render("{{ config.missing }}", &ctx());
    match result {
        Err(Error::UndefinedVariable { variable }) => assert_eq!(variable, "config.missing"),
        other => panic!("expected undefined variable, got {other:?}"),
    }
}

#[test]
fn test_no_templates() {
    let result = render("plain string without templates", &TemplateContext::new()).unwrap();
    assert_eq!(result, "plain string without templates");
}

#[test]
fn test_has_templates() {
    assert!(has_templates("{{ config.key }}"));
    assert!(has_templates("prefix {{ var }} suffix"));
    assert!(!has_templates("no templates here"));
    assert!(!has_templates("{ not a template }"));
}

#[test]
fn test_or_fallback() {
    let c = ctx();
    assert_eq!(
        render("{{ stream_state.cursor or '2020-01-01' }}", &c).unwrap(),
        "2020-01-01"
    );
    assert_eq!(
        render("{{ stream_state.updated_at or '2020-01-01' }}", &c).unwrap(),
        "2024-01-02T00:00:00Z"
    );
}

#[test]
fn test_default_filter() {
    let c = ctx();
    assert_eq!(render("{{ config.missing | default('x') }}", &c).unwrap(), "x");
    assert_eq!(render("{{ config.host | default('x') }}", &c).unwrap(), "api.example.com");
}

#[test_case("{{ config.host | upper }}", "API.EXAMPLE.COM" ; "upper")]
#[test_case("{{ 'ABC' | lower }}", "abc" ; "lower")]
#[test_case("{{ '  x  ' | trim }}", "x" ; "trim")]
#[test_case("{{ 'a b&c' | urlencode }}", "a+b%26c" ; "urlencode")]
#[test_case("{{ config.accounts | length }}", "2" ; "length")]
#[test_case("{{ config.limit + 1 }}", "101" ; "addition")]
#[test_case("{{ config.limit * 2 }}", "200" ; "multiplication")]
#[test_case("{{ 'a' ~ config.limit }}", "a100" ; "concat")]
#[test_case("{{ max(3, 7) }}", "7" ; "max")]
#[test_case("{{ min('2024-01-05', '2024-01-03') }}", "2024-01-03" ; "min strings")]
#[test_case("{{ str(5) }}", "5" ; "str")]
fn test_expression_rendering(template: &str, expected: &str) {
    assert_eq!(render(template, &ctx()).unwrap(), expected);
}

#[test_case("{{ config.limit > 50 }}", true ; "greater")]
#[test_case("{{ config.limit == 100 }}", true ; "equal")]
#[test_case("{{ config.limit != 100 }}", false ; "not equal")]
#[test_case("{{ not config.enabled }}", false ; "not")]
#[test_case("{{ config.enabled and config.limit < 10 }}", false ; "and")]
#[test_case("{{ 'a' in config.accounts }}", true ; "in list")]
#[test_case("{{ 'z' not in config.accounts }}", true ; "not in")]
#[test_case("{{ config.missing }}", false ; "undefined is falsy")]
fn test_conditions(template: &str, expected: bool) {
    let condition = InterpolatedString::new(template).unwrap();
    assert_eq!(condition.eval_bool(&ctx()).unwrap(), expected);
}

#[test]
fn test_eval_keeps_type_for_single_expression() {
    let c = ctx();
    assert_eq!(eval("{{ config.limit }}", &c).unwrap(), json!(100));
    assert_eq!(eval("{{ config.accounts }}", &c).unwrap(), json!(["a", "b"]));
    assert_eq!(eval("limit={{ config.limit }}", &c).unwrap(), json!("limit=100"));
    assert_eq!(eval("plain", &c).unwrap(), json!("plain"));
}

#[test]
fn test_render_value_object() {
    let input = json!({
        "header": "X-API-Key",
        "value": "{{ config.api_key }}",
        "size": "{{ config.limit }}"
    });

    let result = render_value(&input, &ctx()).unwrap();
    assert_eq!(
        result,
        json!({
            "header": "X-API-Key",
            "value": "sk_test_123",
            "size": 100
        })
    );
}

#[test]
fn test_number_substitution() {
    let result = render(
        "limit={{ config.limit }}&enabled={{ config.enabled }}",
        &ctx(),
    )
    .unwrap();
    assert_eq!(result, "limit=100&enabled=true");
}

#[test]
fn test_whitespace_in_template() {
    let c = ctx();
    assert_eq!(render("{{config.api_key}}", &c).unwrap(), "sk_test_123");
    assert_eq!(render("{{  config.api_key  }}", &c).unwrap(), "sk_test_123");
}

#[test]
fn test_unqualified_names_resolve_against_config() {
    assert_eq!(render("{{ api_key }}", &ctx()).unwrap(), "sk_test_123");
}

#[test]
fn test_render_optional() {
    let c = ctx();
    assert_eq!(render_optional("test {{ config.api_key }}", &c), "test sk_test_123");
    assert_eq!(
        render_optional("test {{ config.missing }}", &c),
        "test {{ config.missing }}"
    );
}

#[test]
fn test_interpolated_string_default() {
    let template = InterpolatedString::new("{{ stream_state.cursor }}")
        .unwrap()
        .with_default("{{ config.host }}")
        .unwrap();
    assert_eq!(template.render(&ctx()).unwrap(), "api.example.com");

    let without_default = InterpolatedString::new("{{ stream_state.cursor }}").unwrap();
    assert!(without_default.render(&ctx()).is_err());
}

#[test]
fn test_interpolated_string_deserializes_and_validates() {
    let parsed: InterpolatedString = serde_json::from_value(json!("{{ config.host }}")).unwrap();
    assert_eq!(parsed.as_str(), "{{ config.host }}");
    assert!(!parsed.is_static());

    let broken: Result<InterpolatedString, _> = serde_json::from_value(json!("{{ config. }}"));
    assert!(broken.is_err());
}

#[test]
fn test_datetime_functions() {
    let c = ctx();
    assert_eq!(
        render("{{ format_datetime('2024-01-15T10:30:00Z', '%Y/%m/%d') }}", &c).unwrap(),
        "2024/01/15"
    );
    assert_eq!(
        eval("{{ timestamp('2024-01-01T00:00:00Z') }}", &c).unwrap(),
        json!(1_704_067_200)
    );
    let now = render("{{ now_utc() }}", &c).unwrap();
    assert!(crate::types::parse_datetime(&now).is_ok());
    let today = render("{{ today_utc() }}", &c).unwrap();
    assert_eq!(today.len(), 10);
    let yesterday = render("{{ day_delta(-1, '%Y-%m-%d') }}", &c).unwrap();
    assert!(yesterday < today);
}

#[test]
fn test_unknown_function_is_an_error() {
    assert!(render("{{ explode() }}", &ctx()).is_err());
    assert!(render("{{ config.host | explode }}", &ctx()).is_err());
}
