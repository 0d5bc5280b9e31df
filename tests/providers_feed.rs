// tests/providers_feed.rs
use chrono::{TimeZone, Utc};
use source_sentinel::ingest::providers::feed::parse_feed;
use source_sentinel::{FetchError, Priority, SourceDescriptor, SourceType};

// 'static fixtures via include_str!
const RSS_XML: &str = include_str!("fixtures/regulator_rss.xml");
const ATOM_XML: &str = include_str!("fixtures/agency_atom.xml");

fn src(name: &str) -> SourceDescriptor {
    SourceDescriptor {
        name: name.into(),
        authority: "Regulator".into(),
        source_type: SourceType::Feed,
        priority: Priority::High,
        recency_days: 30,
        category: None,
        url: "https://regulator.example/press.rss".into(),
        timeout_secs: None,
    }
}

#[test]
fn rss_fixture_yields_normalized_items() {
    let items = parse_feed(RSS_XML, &src("Regulator Press")).expect("rss parse ok");

    // blank title dropped
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.authority == "Regulator"));
    assert!(items.iter().all(|i| i.source_type == SourceType::Feed));

    let first = &items[0];
    assert_eq!(
        first.url,
        "https://regulator.example/press/2026/outsourcing-guidelines"
    );
    assert_eq!(first.summary, "The guidelines apply from 1 January 2027.");
    assert_eq!(
        first.published_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap())
    );

    assert_eq!(
        items[1].title,
        "Consultation on \"operational resilience\" testing"
    );
    assert_eq!(
        items[1].published_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap())
    );
}

#[test]
fn atom_fixture_prefers_published_over_updated() {
    let items = parse_feed(ATOM_XML, &src("Agency News")).expect("atom parse ok");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url, "https://agency.example/news/custody-call");
    assert_eq!(
        items[0].published_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap())
    );
    assert_eq!(
        items[1].published_at,
        Some(Utc.with_ymd_and_hms(2026, 2, 27, 7, 15, 0).unwrap())
    );
    assert_eq!(items[1].summary, "");
}

#[test]
fn non_feed_document_is_a_parse_error() {
    let err = parse_feed("<html><body>Maintenance</body></html>", &src("X")).unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)));
}
