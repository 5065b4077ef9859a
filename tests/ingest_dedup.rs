// tests/ingest_dedup.rs
use std::collections::HashSet;

use chrono::Utc;

use ai_news_collector::ingest::types::{MediaType, NewsItem, Source};
use ai_news_collector::ingest::{admit_with_quota, dedupe_and_select, KeywordPolicy};

fn item(url: &str) -> NewsItem {
    NewsItem {
        title: format!("item {url}"),
        content: String::new(),
        summary: String::new(),
        source: Source::Bilibili,
        source_url: url.to_string(),
        embed_url: None,
        media_type: MediaType::Video,
        published_at: Utc::now(),
        thumbnail_url: None,
        extras: Default::default(),
    }
}

fn urls(items: &[NewsItem]) -> Vec<&str> {
    items.iter().map(|i| i.source_url.as_str()).collect()
}

#[test]
fn duplicates_within_and_across_lists_keep_first_seen_order() {
    let lists = vec![
        vec![item("a"), item("b"), item("a")],
        vec![item("c"), item("b")],
        vec![item("d"), item("c")],
    ];
    let out = dedupe_and_select(lists, &HashSet::new(), 10);
    assert_eq!(urls(&out), vec!["a", "b", "c", "d"]);

    let distinct: HashSet<_> = out.iter().map(|i| &i.source_url).collect();
    assert_eq!(distinct.len(), out.len());
}

#[test]
fn first_occurrence_wins_even_with_different_payload() {
    let mut later = item("a");
    later.title = "later copy".into();
    let out = dedupe_and_select(vec![vec![item("a")], vec![later]], &HashSet::new(), 10);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "item a");
}

#[test]
fn existing_keys_are_removed_before_truncation() {
    let existing: HashSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
    let lists = vec![vec![item("a"), item("b"), item("c"), item("d"), item("e")]];
    let out = dedupe_and_select(lists, &existing, 2);
    assert_eq!(urls(&out), vec!["b", "d"]);
}

#[test]
fn rerunning_against_own_output_yields_nothing() {
    let lists = vec![vec![item("a"), item("b")], vec![item("b"), item("c")]];
    let first = dedupe_and_select(lists.clone(), &HashSet::new(), 10);
    let seen: HashSet<String> = first.iter().map(|i| i.source_url.clone()).collect();
    let second = dedupe_and_select(lists, &seen, 10);
    assert!(second.is_empty());
}

#[test]
fn end_to_end_selection_order() {
    let lists = vec![
        vec![item("A"), item("B"), item("C")],
        vec![item("B"), item("D")],
        vec![item("E")],
    ];
    let out = dedupe_and_select(lists, &HashSet::new(), 4);
    assert_eq!(urls(&out), vec!["A", "B", "C", "D"]);
}

#[test]
fn quota_fills_first_half_with_anything_then_requires_relevance() {
    // Only the first item is relevant (k = 1 < limit / 2); nothing is filtered.
    let policy = KeywordPolicy::new(["tutorial"], ["gpt"]);
    let titles = vec![
        "gpt drop", "cats", "dogs", "weather", "gpt-5 notes", "birds", "gpt agents", "fish",
        "gpt vision",
    ];
    let limit = 6;
    let out = admit_with_quota(titles, &policy, limit, |s| s.to_string());

    assert_eq!(out.len(), limit);
    assert_eq!(out, vec!["gpt drop", "cats", "dogs", "gpt-5 notes", "gpt agents", "gpt vision"]);
    // Everything admitted once half the quota was filled passes the include list.
    for (i, t) in out.iter().enumerate() {
        if i * 2 >= limit {
            assert!(policy.is_relevant(t), "{t} admitted past the half mark");
        }
    }
}

#[test]
fn quota_returns_short_list_when_relevance_runs_out() {
    let policy = KeywordPolicy::new(Vec::<&str>::new(), ["gpt"]);
    let out = admit_with_quota(vec!["a", "b", "c", "d"], &policy, 4, |s| s.to_string());
    assert_eq!(out, vec!["a", "b"]);
}

#[test]
fn filter_list_is_absolute_even_in_first_half() {
    let policy = KeywordPolicy::new(["tutorial"], ["gpt"]);
    let out = admit_with_quota(
        vec!["GPT Tutorial", "news", "more news"],
        &policy,
        4,
        |s| s.to_string(),
    );
    assert_eq!(out, vec!["news", "more news"]);
}
