// src/models/record.rs

//! Tracked repository records and the list filter.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Star count at which a record counts as "popular".
pub const POPULAR_STARS: u64 = 1000;

/// Star count at which a record counts as "notable" (below popular).
pub const NOTABLE_STARS: u64 = 100;

/// One tracked repository and its derived metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: i64,

    /// `owner/name`, unique across the store
    pub repo_full_name: String,

    pub github_url: String,

    /// Overwritten on every scan
    pub stars: u64,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub primary_language: String,

    /// Path of the file that matched the search
    #[serde(default)]
    pub dockerfile_path: String,

    /// Classification of how the record was discovered
    #[serde(default)]
    pub source_type: String,

    /// Date of the earliest commit introducing `dockerfile_path`.
    /// Set once and never overwritten by a later scan.
    pub adopted_at: Option<DateTime<Utc>>,

    /// Link to the adoption commit, paired with `adopted_at`
    pub adoption_commit: Option<String>,

    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scan result to merge into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpsert {
    pub repo_full_name: String,
    pub github_url: String,
    pub stars: u64,
    pub description: String,
    pub primary_language: String,
    pub dockerfile_path: String,
    pub source_type: String,
    pub adopted_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Build a fresh record from a scan result.
    pub fn create(id: i64, scan: RecordUpsert, now: DateTime<Utc>) -> Self {
        Self {
            id,
            repo_full_name: scan.repo_full_name,
            github_url: scan.github_url,
            stars: scan.stars,
            description: scan.description,
            primary_language: scan.primary_language,
            dockerfile_path: scan.dockerfile_path,
            source_type: scan.source_type,
            adopted_at: scan.adopted_at,
            adoption_commit: None,
            first_seen_at: now,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a rescan into an existing record.
    ///
    /// Scan fields are last-write-wins; the adoption date keeps its existing
    /// value and only takes the candidate when currently unset.
    pub fn merge(&mut self, scan: RecordUpsert, now: DateTime<Utc>) {
        self.github_url = scan.github_url;
        self.stars = scan.stars;
        self.description = scan.description;
        self.primary_language = scan.primary_language;
        self.dockerfile_path = scan.dockerfile_path;
        self.source_type = scan.source_type;
        self.adopted_at = self.adopted_at.or(scan.adopted_at);
        self.last_seen_at = now;
        self.updated_at = now;
    }

    pub fn is_popular(&self) -> bool {
        self.stars >= POPULAR_STARS
    }

    pub fn is_notable(&self) -> bool {
        (NOTABLE_STARS..POPULAR_STARS).contains(&self.stars)
    }
}

/// Sort column for record listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Stars,
    Name,
    FirstSeen,
    Adopted,
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stars" => Ok(Self::Stars),
            "name" => Ok(Self::Name),
            "first_seen" => Ok(Self::FirstSeen),
            "adopted" => Ok(Self::Adopted),
            other => Err(AppError::validation(format!(
                "unknown sort field '{other}' (use stars, name, first_seen or adopted)"
            ))),
        }
    }
}

/// Sort direction for record listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AppError::validation(format!(
                "unknown sort order '{other}' (use asc or desc)"
            ))),
        }
    }
}

/// Filter, sort and pagination options for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub min_stars: Option<u64>,
    pub max_stars: Option<u64>,
    /// Case-insensitive substring over repository name and description
    pub search: Option<String>,
    pub source_type: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RecordFilter {
    /// Whether a record passes the filter predicates.
    pub fn matches(&self, record: &Record) -> bool {
        if self.min_stars.is_some_and(|min| record.stars < min) {
            return false;
        }
        if self.max_stars.is_some_and(|max| record.stars > max) {
            return false;
        }
        if let Some(source) = self.source_type.as_deref().filter(|s| !s.is_empty()) {
            if record.source_type != source {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            return record.repo_full_name.to_lowercase().contains(&needle)
                || record.description.to_lowercase().contains(&needle);
        }
        true
    }

    /// Filter, sort and paginate a set of records.
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Vec<Record> {
        let mut selected: Vec<Record> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            let ordering = self.compare(a, b);
            match self.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let page = selected.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = match self.sort {
            SortField::Stars => a.stars.cmp(&b.stars),
            SortField::Name => a.repo_full_name.cmp(&b.repo_full_name),
            SortField::FirstSeen => a.first_seen_at.cmp(&b.first_seen_at),
            SortField::Adopted => a.adopted_at.cmp(&b.adopted_at),
        };
        // Stable tiebreak so pagination is repeatable
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn scan(name: &str, stars: u64) -> RecordUpsert {
        RecordUpsert {
            repo_full_name: name.to_string(),
            github_url: format!("https://github.com/{name}"),
            stars,
            description: format!("{name} description"),
            primary_language: "Go".to_string(),
            dockerfile_path: "Dockerfile".to_string(),
            source_type: "dockerfile".to_string(),
            adopted_at: None,
        }
    }

    #[test]
    fn test_merge_keeps_existing_adoption_date() {
        let mut record = Record::create(1, scan("acme/api", 10), at(1));
        record.adopted_at = Some(at(2));

        let mut rescan = scan("acme/api", 25);
        rescan.adopted_at = Some(at(9));
        record.merge(rescan, at(10));

        assert_eq!(record.adopted_at, Some(at(2)));
        assert_eq!(record.stars, 25);
        assert_eq!(record.first_seen_at, at(1));
        assert_eq!(record.last_seen_at, at(10));
    }

    #[test]
    fn test_merge_fills_missing_adoption_date() {
        let mut record = Record::create(1, scan("acme/api", 10), at(1));
        let mut rescan = scan("acme/api", 10);
        rescan.adopted_at = Some(at(5));
        record.merge(rescan, at(6));
        assert_eq!(record.adopted_at, Some(at(5)));
    }

    #[test]
    fn test_tiers() {
        let mut record = Record::create(1, scan("acme/api", 1000), at(1));
        assert!(record.is_popular());
        assert!(!record.is_notable());
        record.stars = 100;
        assert!(record.is_notable());
        record.stars = 99;
        assert!(!record.is_notable());
    }

    #[test]
    fn test_filter_search_and_sort() {
        let records = vec![
            Record::create(1, scan("acme/api", 50), at(1)),
            Record::create(2, scan("acme/web", 500), at(2)),
            Record::create(3, scan("other/tool", 5000), at(3)),
        ];

        let filter = RecordFilter {
            search: Some("ACME".to_string()),
            ..RecordFilter::default()
        };
        let names: Vec<_> = filter
            .apply(&records)
            .into_iter()
            .map(|r| r.repo_full_name)
            .collect();
        assert_eq!(names, vec!["acme/web", "acme/api"]);

        let filter = RecordFilter {
            min_stars: Some(100),
            sort: SortField::Name,
            order: SortOrder::Asc,
            ..RecordFilter::default()
        };
        let names: Vec<_> = filter
            .apply(&records)
            .into_iter()
            .map(|r| r.repo_full_name)
            .collect();
        assert_eq!(names, vec!["acme/web", "other/tool"]);
    }

    #[test]
    fn test_filter_pagination() {
        let records: Vec<_> = (1..=5)
            .map(|i| Record::create(i, scan(&format!("acme/r{i}"), i as u64), at(1)))
            .collect();
        let filter = RecordFilter {
            limit: Some(2),
            offset: 1,
            ..RecordFilter::default()
        };
        let stars: Vec<_> = filter.apply(&records).iter().map(|r| r.stars).collect();
        assert_eq!(stars, vec![4, 3]);
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("first_seen".parse::<SortField>().unwrap(), SortField::FirstSeen);
        assert!("bogus".parse::<SortField>().is_err());
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
    }
}
