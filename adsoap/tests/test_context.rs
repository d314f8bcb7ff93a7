use adsoap::context::{HEADER_KEY, HTTP_SECTION, NOTIFICATION_PARAM};
use adsoap::{
    ConnectionOptions, ContextParam, HttpOptions, NotificationCallback, OptionValue,
    SectionOptions, StreamContext, create_stream_context,
};
use std::sync::Arc;

fn section(entries: Vec<(&str, OptionValue)>) -> SectionOptions {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn base_context() -> StreamContext {
    let mut options = ConnectionOptions::new();
    options.insert(
        "http".to_string(),
        section(vec![
            ("method", "POST".into()),
            (HEADER_KEY, "Accept: */*\r\nContent-Type: application/json".into()),
        ]),
    );
    options.insert(
        "ssl".to_string(),
        section(vec![
            ("peer_name", "localhost".into()),
            ("verify_peer", true.into()),
        ]),
    );
    StreamContext::new(options)
}

#[test]
fn test_create_stream_context_without_merge() {
    let ctx = create_stream_context(section(vec![(HEADER_KEY, "Accept: */*".into())]), None);

    let mut expected = ConnectionOptions::new();
    expected.insert(
        HTTP_SECTION.to_string(),
        section(vec![(HEADER_KEY, "Accept: */*".into())]),
    );
    assert_eq!(ctx.options(), &expected);
}

#[test]
fn test_create_stream_context_when_origin_has_http_options() {
    let base = base_context();
    let before = base.options().clone();

    let ctx = create_stream_context(
        section(vec![
            (
                HEADER_KEY,
                vec![
                    "Accept-Language: ru",
                    "Client-Login: foo",
                    "Use-Operator-Units: true",
                ]
                .into(),
            ),
            ("protocol_version", "1.1".into()),
        ]),
        Some(&base),
    );

    let mut expected = ConnectionOptions::new();
    expected.insert(
        "http".to_string(),
        section(vec![
            ("method", "POST".into()),
            (
                HEADER_KEY,
                [
                    "Accept: */*",
                    "Content-Type: application/json",
                    "Accept-Language: ru",
                    "Client-Login: foo",
                    "Use-Operator-Units: true",
                ]
                .join("\r\n")
                .into(),
            ),
            ("protocol_version", "1.1".into()),
        ]),
    );
    expected.insert(
        "ssl".to_string(),
        section(vec![
            ("peer_name", "localhost".into()),
            ("verify_peer", true.into()),
        ]),
    );

    assert_eq!(ctx.options(), &expected);
    // le contexte d'origine n'est pas modifié
    assert_eq!(base.options(), &before);
}

#[test]
fn test_create_stream_context_when_origin_has_parameters() {
    let on_notification: NotificationCallback = Arc::new(|_message: &str| {});

    let mut options = ConnectionOptions::new();
    options.insert(
        "socket".to_string(),
        section(vec![("bindto", "192.168.0.100:0".into())]),
    );
    let base = StreamContext::new(options).with_notification(on_notification.clone());

    let header = [
        "Accept-Language: ru",
        "Client-Login: foo",
        "Use-Operator-Units: true",
    ]
    .join("\r\n");
    let ctx = create_stream_context(section(vec![(HEADER_KEY, header.clone().into())]), Some(&base));

    let mut expected = ConnectionOptions::new();
    expected.insert(
        "socket".to_string(),
        section(vec![("bindto", "192.168.0.100:0".into())]),
    );
    expected.insert(
        "http".to_string(),
        section(vec![(HEADER_KEY, header.into())]),
    );
    assert_eq!(ctx.options(), &expected);

    assert!(matches!(
        ctx.param(NOTIFICATION_PARAM),
        Some(ContextParam::Notification(_))
    ));
    let callback = ctx.notification().unwrap();
    assert!(Arc::ptr_eq(callback, &on_notification));
}

#[test]
fn test_overlay_replaces_other_keys() {
    let base = base_context();
    let ctx = create_stream_context(section(vec![("method", "GET".into())]), Some(&base));

    assert_eq!(ctx.option("http", "method"), Some(&OptionValue::from("GET")));
    assert_eq!(
        ctx.header_lines(),
        vec!["Accept: */*", "Content-Type: application/json"]
    );
}

#[test]
fn test_repeated_builds_are_independent() {
    let base = base_context();

    let first = create_stream_context(section(vec![(HEADER_KEY, "A: 1".into())]), Some(&base));
    let second = create_stream_context(section(vec![(HEADER_KEY, "B: 2".into())]), Some(&base));

    assert_eq!(
        first.header_lines(),
        vec!["Accept: */*", "Content-Type: application/json", "A: 1"]
    );
    assert_eq!(
        second.header_lines(),
        vec!["Accept: */*", "Content-Type: application/json", "B: 2"]
    );
}

#[test]
fn test_chained_builds_keep_appending() {
    let first = create_stream_context(section(vec![(HEADER_KEY, vec!["A: 1"].into())]), None);
    let second = create_stream_context(section(vec![(HEADER_KEY, "B: 2".into())]), Some(&first));

    assert_eq!(
        second.option(HTTP_SECTION, HEADER_KEY),
        Some(&OptionValue::Text("A: 1\r\nB: 2".to_string()))
    );
}

#[test]
fn test_params_pass_through() {
    let base = StreamContext::default().with_param("timeout", OptionValue::Int(30));
    let ctx = create_stream_context(HttpOptions::new(), Some(&base));

    assert!(matches!(
        ctx.param("timeout"),
        Some(ContextParam::Value(OptionValue::Int(30)))
    ));
    assert!(ctx.notification().is_none());
}
