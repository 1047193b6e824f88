//! Google News RSS coverage for a subject.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use rivalscope_core::{SourceKind, SourcePayload};

use crate::collector::SourceFetcher;
use crate::error::SourceError;
use crate::scorer::mean_score;

use super::{check_status, trim_base};

const MAX_ITEMS: usize = 25;
const MAX_HEADLINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FeedItem {
    pub(crate) title: String,
    pub(crate) description: String,
}

impl FeedItem {
    fn text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

/// Searches an RSS news endpoint and scores the headlines.
#[derive(Debug, Clone)]
pub struct NewsFetcher {
    client: Client,
    base_url: String,
}

impl NewsFetcher {
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    fn search_url(&self, subject_id: &str, area_id: &str) -> String {
        let query = format!("{subject_id} {area_id}");
        let encoded = utf8_percent_encode(&query, NON_ALPHANUMERIC);
        format!(
            "{}/rss/search?q={encoded}&hl=en-US&gl=US&ceid=US:en",
            self.base_url
        )
    }
}

#[async_trait]
impl SourceFetcher for NewsFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    async fn fetch(&self, subject_id: &str, area_id: &str) -> Result<SourcePayload, SourceError> {
        let url = self.search_url(subject_id, area_id);
        let response = self.client.get(&url).send().await?;
        let body = check_status(response, &url)?.text().await?;
        let items = parse_rss_feed(&body, MAX_ITEMS)?;

        tracing::debug!(subject = subject_id, items = items.len(), "parsed news feed");

        let texts: Vec<String> = items.iter().map(FeedItem::text).collect();
        Ok(SourcePayload::News {
            sentiment: mean_score(texts.iter().map(String::as_str)),
            article_count: u32::try_from(items.len()).unwrap_or(u32::MAX),
            headlines: items
                .into_iter()
                .take(MAX_HEADLINES)
                .map(|item| item.title)
                .collect(),
        })
    }
}

/// Extracts `<item>` title/description pairs from an RSS body, stopping
/// after `max_items`. Items without a title are skipped.
///
/// # Errors
///
/// Returns [`SourceError::Xml`] if the XML is malformed.
pub(crate) fn parse_rss_feed(xml: &str, max_items: usize) -> Result<Vec<FeedItem>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut in_item = false;
    let mut current_tag = String::new();
    let mut title = String::new();
    let mut description = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "item" {
                    in_item = true;
                    title.clear();
                    description.clear();
                }
                current_tag = name;
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" && in_item {
                    in_item = false;
                    if !title.is_empty() {
                        items.push(FeedItem {
                            title: title.clone(),
                            description: description.clone(),
                        });
                        if items.len() >= max_items {
                            break;
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) if in_item => {
                let text = e.unescape().unwrap_or_default().into_owned();
                assign_field(&current_tag, text, &mut title, &mut description);
            }
            Ok(Event::CData(e)) if in_item => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                assign_field(&current_tag, text, &mut title, &mut description);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Xml(e)),
            _ => {}
        }
    }

    Ok(items)
}

fn assign_field(tag: &str, text: String, title: &mut String, description: &mut String) {
    match tag {
        "title" => *title = text,
        "description" => *description = strip_html(&text),
        _ => {}
    }
}

/// Strip HTML tags from a string, returning plain text.
pub(crate) fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.trim().to_string()
}
