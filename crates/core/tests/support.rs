//! Shared fixtures for engine-level integration tests.

#![allow(dead_code)]

use relaypost_core::testing::{media, sample_item, term, TestEnv};
use relaypost_domain::{ContentItem, TaxonomyKind};

/// Environment with `targets` registered and item 1 available locally.
pub async fn env_with_targets(targets: &[&str]) -> TestEnv {
    let env = TestEnv::new();
    for id in targets {
        env.add_target(id).await.expect("target should be registered");
    }
    env.content.insert_item(sample_item(1));
    env
}

/// Item 2: a nested category, a tag, a featured image and one inline image.
pub fn rich_item(env: &TestEnv) -> ContentItem {
    let parent = term(10, "Engineering", None);
    let child = term(11, "Rust", Some(10));
    env.content.insert_term(TaxonomyKind::Category, parent);
    env.content.insert_term(TaxonomyKind::Category, child.clone());

    let inline = media(21, "diagram.png");
    let mut item = sample_item(2);
    item.categories = vec![child];
    item.tags = vec![term(30, "Release Notes", None)];
    item.featured_media = Some(media(20, "hero.jpg"));
    item.body = format!("<p>See</p><img src=\"{}\">", inline.source_url);
    item.attachments = vec![inline];
    env.content.insert_item(item.clone());
    item
}
