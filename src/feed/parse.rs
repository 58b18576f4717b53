// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::FeedError;

/// One feed item with a downloadable enclosure.
///
/// Duration and publish date are kept raw here; their lenient parsing
/// happens per field so a bad value degrades that field only.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub enclosure_url: String,
    pub enclosure_length: u64,
    pub duration: Option<String>,
    pub pub_date: Option<String>,
}

/// Parse RSS feed XML bytes into episode descriptors.
///
/// Items without an enclosure carry nothing to download and are skipped.
pub fn parse_feed(xml_bytes: &[u8]) -> Result<Vec<FeedItem>, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;
    Ok(channel.items().iter().filter_map(parse_item).collect())
}

fn parse_item(item: &rss::Item) -> Option<FeedItem> {
    let enclosure = item.enclosure()?;

    Some(FeedItem {
        title: item
            .title()
            .map(String::from)
            .unwrap_or_else(|| "Untitled Episode".to_string()),
        enclosure_url: enclosure.url().to_string(),
        enclosure_length: enclosure.length().parse().unwrap_or(0),
        duration: item
            .itunes_ext()
            .and_then(|ext| ext.duration().map(String::from)),
        pub_date: item.pub_date().map(String::from),
    })
}

/// Parse an itunes duration into whole seconds.
///
/// Accepts `H:MM:SS`, `MM:SS`, `M:SS` and bare seconds. Feeds sometimes
/// write total minutes into the first of two components ("75:30"), so
/// two-component values always fold as `minutes*60 + seconds`. Anything
/// else yields 0.
pub fn parse_duration(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else { return 0 };

    let numbers: Option<Vec<u64>> = raw
        .trim()
        .split(':')
        .map(|part| part.parse().ok())
        .collect();
    let Some(numbers) = numbers else {
        debug!(raw, "unparseable episode duration");
        return 0;
    };

    match numbers.as_slice() {
        [seconds] => *seconds,
        [minutes, seconds] => minutes * 60 + seconds,
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            hours * 3600 + minutes * 60 + seconds
        }
        _ => {
            debug!(raw, "unparseable episode duration");
            0
        }
    }
}

/// Matches the `D MMM YYYY HH:mm:ss` core anywhere in a date string, so
/// RFC 2822 dates parse through their day-month-year-time fields.
static DATE_CORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})\s+(\d{1,2}):(\d{2}):(\d{2})").unwrap()
});

/// Parse a feed publish date, accepting abbreviated or full month names.
/// Offsets are ignored; the naive time is taken as UTC.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let caps = DATE_CORE.captures(raw)?;
    let core = format!(
        "{} {} {} {}:{}:{}",
        &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]
    );

    NaiveDateTime::parse_from_str(&core, "%d %b %Y %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&core, "%d %B %Y %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Publish time with the wall-clock fallback. An episode is never
/// rejected over a bad date; the substitution is warned about, naming
/// the feed and the raw value.
pub fn pub_time_or_now(podname: &str, raw: Option<&str>) -> DateTime<Utc> {
    if let Some(raw) = raw
        && let Some(parsed) = parse_pub_date(raw)
    {
        return parsed;
    }

    warn!(
        podname,
        raw = raw.unwrap_or("<missing>"),
        "unable to parse episode publish date, using current time"
    );
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast for unit testing</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 1</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
      <itunes:duration>30:00</itunes:duration>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Audio</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parse_feed_extracts_items_with_enclosures() {
        let items = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Episode 1");
        assert_eq!(items[0].enclosure_url, "https://example.com/ep1.mp3");
        assert_eq!(items[0].enclosure_length, 1234567);
        assert_eq!(items[0].duration.as_deref(), Some("30:00"));
        assert_eq!(
            items[0].pub_date.as_deref(),
            Some("Mon, 01 Jan 2024 12:00:00 +0000")
        );
    }

    #[test]
    fn parse_feed_defaults_missing_optional_fields() {
        let items = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        let ep2 = &items[1];
        assert_eq!(ep2.title, "Episode 2");
        assert_eq!(ep2.enclosure_length, 0);
        assert!(ep2.duration.is_none());
        assert!(ep2.pub_date.is_none());
    }

    #[test]
    fn parse_feed_rejects_malformed_documents() {
        let result = parse_feed(b"this is not xml at all");
        assert!(matches!(result, Err(FeedError::ParseFailed(_))));
    }

    #[test]
    fn duration_accepts_standard_forms() {
        assert_eq!(parse_duration(Some("1:02:03")), 3723);
        assert_eq!(parse_duration(Some("30:00")), 1800);
        assert_eq!(parse_duration(Some("5:07")), 307);
        assert_eq!(parse_duration(Some("90")), 90);
    }

    #[test]
    fn duration_folds_overflowing_minutes() {
        // 75 minutes 30 seconds, written without an hour field
        assert_eq!(parse_duration(Some("75:30")), 4530);
    }

    #[test]
    fn duration_degrades_to_zero() {
        assert_eq!(parse_duration(None), 0);
        assert_eq!(parse_duration(Some("")), 0);
        assert_eq!(parse_duration(Some("abc")), 0);
        assert_eq!(parse_duration(Some("1:75:30")), 0);
        assert_eq!(parse_duration(Some("1:2:3:4")), 0);
        assert_eq!(parse_duration(Some("-5")), 0);
    }

    #[test]
    fn pub_date_parses_rfc2822_through_its_core() {
        let parsed = parse_pub_date("Mon, 01 Jan 2024 12:00:00 +0000").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn pub_date_accepts_full_month_names() {
        let parsed = parse_pub_date("1 January 2024 06:07:08").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 6, 7, 8).unwrap());
    }

    #[test]
    fn pub_date_rejects_garbage() {
        assert!(parse_pub_date("sometime last week").is_none());
        assert!(parse_pub_date("2024-01-01").is_none());
        assert!(parse_pub_date("1 Notamonth 2024 06:07:08").is_none());
    }

    #[test]
    fn pub_time_falls_back_to_now() {
        let before = Utc::now();
        let fallback = pub_time_or_now("testpod", Some("sometime last week"));
        let after = Utc::now();
        assert!(fallback >= before && fallback <= after);

        let missing = pub_time_or_now("testpod", None);
        assert!(missing >= before);
    }
}
