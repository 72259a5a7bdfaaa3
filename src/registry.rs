use crate::error::{LayoutError, Result};
use crate::measure::ImageDescription;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookmarkKind {
    Chapter,
    Article,
    Section(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bookmark {
    pub label: String,
    pub kind: BookmarkKind,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footnote {
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleFootnotes {
    pub article: String,
    pub entries: Vec<Footnote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub ordinal: usize,
    pub image_id: String,
    pub title: String,
    pub url: String,
    pub license: String,
    pub contributors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocRecord {
    pub text: String,
    /// 0 = group, 1 = chapter, 2 = article
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleAttribution {
    pub title: String,
    pub url: String,
    pub authors: Vec<String>,
}

/// Side-channel output collected over one document render.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentRegistry {
    pub bookmarks: Vec<Bookmark>,
    pub footnotes: Vec<ArticleFootnotes>,
    pub images: BTreeMap<String, ImageRecord>,
    pub article_ids: Vec<String>,
    pub toc: Vec<TocRecord>,
    pub articles: Vec<ArticleAttribution>,
    #[serde(skip)]
    known_articles: HashSet<String>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bookmark(&mut self, label: impl Into<String>, kind: BookmarkKind, anchor: impl Into<String>) {
        self.bookmarks.push(Bookmark {
            label: label.into(),
            kind,
            anchor: anchor.into(),
        });
    }

    pub fn add_toc(&mut self, text: impl Into<String>, level: u8) {
        self.toc.push(TocRecord {
            text: text.into(),
            level,
        });
    }

    pub fn add_article_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.known_articles.insert(id.clone()) {
            self.article_ids.push(id);
        }
    }

    pub fn has_article(&self, id: &str) -> bool {
        self.known_articles.contains(id)
    }

    pub fn add_footnotes(&mut self, article: impl Into<String>, entries: Vec<Footnote>) {
        if entries.is_empty() {
            return;
        }
        self.footnotes.push(ArticleFootnotes {
            article: article.into(),
            entries,
        });
    }

    /// Records an image on first sighting and returns its ordinal.
    pub fn register_image(
        &mut self,
        image_id: &str,
        describe: impl FnOnce() -> ImageDescription,
    ) -> usize {
        if let Some(record) = self.images.get(image_id) {
            return record.ordinal;
        }
        let ordinal = self.images.len() + 1;
        let description = describe();
        self.images.insert(
            image_id.to_string(),
            ImageRecord {
                ordinal,
                image_id: image_id.to_string(),
                title: description.title,
                url: description.url,
                license: description.license,
                contributors: description.contributors,
            },
        );
        ordinal
    }

    /// Image records in order of first appearance.
    pub fn images_by_ordinal(&self) -> Vec<&ImageRecord> {
        let mut records: Vec<&ImageRecord> = self.images.values().collect();
        records.sort_by_key(|record| record.ordinal);
        records
    }

    pub fn add_attribution(&mut self, attribution: ArticleAttribution) {
        self.articles.push(attribution);
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| LayoutError::FatalBackend(format!("registry serialization: {err}")))
    }
}

/// Stable anchor for an article: hex SHA-256 of its wiki base URL and title.
pub fn article_id(wiki_url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(wiki_url.as_bytes());
    hasher.update(capitalize_first(title).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_ids_ignore_title_case_of_first_letter() {
        let a = article_id("https://en.example.org/w", "rust");
        let b = article_id("https://en.example.org/w", "Rust");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, article_id("https://de.example.org/w", "Rust"));
    }

    #[test]
    fn images_keep_first_ordinal() {
        let mut registry = DocumentRegistry::new();
        let first = registry.register_image("b.png", ImageDescription::default);
        let second = registry.register_image("a.png", ImageDescription::default);
        let again = registry.register_image("b.png", || panic!("described twice"));
        assert_eq!((first, second, again), (1, 2, 1));
        let ordered: Vec<&str> = registry
            .images_by_ordinal()
            .iter()
            .map(|r| r.image_id.as_str())
            .collect();
        assert_eq!(ordered, vec!["b.png", "a.png"]);
    }

    #[test]
    fn serializes_to_json() {
        let mut registry = DocumentRegistry::new();
        registry.add_bookmark("Intro", BookmarkKind::Section(2), "heading2");
        registry.add_article_id("abc");
        registry.add_article_id("abc");
        let json = registry.to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["bookmarks"][0]["label"], "Intro");
        assert_eq!(value["article_ids"].as_array().map(Vec::len), Some(1));
        assert!(value.get("known_articles").is_none());
    }
}
