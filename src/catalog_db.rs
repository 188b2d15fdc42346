use std::path::Path;

use chrono::Utc;
use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    Table,
    TableDefinition,
};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    model::{
        Bookmark,
        Chapter,
        NewChapter,
        NewTitle,
        Principal,
        TitleRecord,
        TitleStats,
        TitleStatus,
        TitleSummary,
    },
    query_filter::TitleFilter,
    rating,
    store::TitleStore,
};

const TITLES: TableDefinition<&str, &[u8]> = TableDefinition::new("titles");
const CHAPTERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("chapters");
/// Keyed by (title id, user id).
const RATINGS: TableDefinition<(&str, &str), u8> =
    TableDefinition::new("ratings");
/// Keyed by (user id, title id).
const BOOKMARKS: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("bookmarks");

pub const MAX_ALTERNATIVE_TITLES: usize = 50;

/// Filters and paging for [`CatalogDb::list_titles`].
#[derive(Debug, Clone)]
pub struct TitleListQuery {
    pub genre: Option<String>,
    pub status: Option<TitleStatus>,
    pub page: usize,
    pub limit: usize,
}

impl Default for TitleListQuery {
    fn default() -> Self {
        Self {
            genre: None,
            status: None,
            page: 1,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleList {
    pub items: Vec<TitleSummary>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CatalogCounts {
    pub titles: usize,
    pub chapters: usize,
    pub ratings: usize,
    pub bookmarks: usize,
}

/// The document store holding titles and everything hanging off them.
pub struct CatalogDb {
    db: Database,
}

fn load_title(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<Option<TitleRecord>> {
    match table.get(id)? {
        Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        None => Ok(None),
    }
}

fn require_title(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<TitleRecord> {
    load_title(table, id)?.ok_or_else(|| Error::not_found("title", id))
}

fn put_title(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    record: &TitleRecord,
) -> Result<()> {
    let bytes = serde_json::to_vec(record)?;
    table.insert(record.id.as_str(), bytes.as_slice())?;
    Ok(())
}

fn load_chapter(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<Option<Chapter>> {
    match table.get(id)? {
        Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        None => Ok(None),
    }
}

fn load_bookmark(
    table: &impl ReadableTable<(&'static str, &'static str), &'static [u8]>,
    user_id: &str,
    title_id: &str,
) -> Result<Option<Bookmark>> {
    match table.get((user_id, title_id))? {
        Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        None => Ok(None),
    }
}

fn put_bookmark(
    table: &mut Table<'_, (&'static str, &'static str), &'static [u8]>,
    bookmark: &Bookmark,
) -> Result<()> {
    let bytes = serde_json::to_vec(bookmark)?;
    table.insert(
        (bookmark.user_id.as_str(), bookmark.title_id.as_str()),
        bytes.as_slice(),
    )?;
    Ok(())
}

/// A last-read pointer must name a chapter of the bookmarked title.
fn check_chapter_belongs(
    chapters: &impl ReadableTable<&'static str, &'static [u8]>,
    chapter_id: Option<&str>,
    title_id: &str,
) -> Result<()> {
    let Some(chapter_id) = chapter_id else {
        return Ok(());
    };
    match load_chapter(chapters, chapter_id)? {
        Some(chapter) if chapter.title_id == title_id => Ok(()),
        _ => Err(Error::InvalidRequest(format!(
            "chapter {chapter_id} does not belong to title {title_id}"
        ))),
    }
}

fn validate_new_title(input: &NewTitle) -> Result<()> {
    if input.title.trim().is_empty() {
        return Err(Error::InvalidRequest("title must not be empty".into()));
    }
    if input.alternative_titles.len() > MAX_ALTERNATIVE_TITLES {
        return Err(Error::InvalidRequest(format!(
            "at most {MAX_ALTERNATIVE_TITLES} alternative titles are allowed"
        )));
    }
    Ok(())
}

fn require_active(principal: &Principal) -> Result<()> {
    if principal.is_banned {
        Err(Error::Forbidden(format!(
            "user {} is banned",
            principal.user_id
        )))
    } else {
        Ok(())
    }
}

impl CatalogDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(TITLES)?;
        txn.open_table(CHAPTERS)?;
        txn.open_table(RATINGS)?;
        txn.open_table(BOOKMARKS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Titles --

    pub fn create_title(&self, input: NewTitle) -> Result<TitleRecord> {
        validate_new_title(&input)?;
        let record = TitleRecord::from_new(input, Utc::now());

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TITLES)?;
            if table.get(record.id.as_str())?.is_some() {
                return Err(Error::Conflict(format!(
                    "title {} already exists",
                    record.id
                )));
            }
            put_title(&mut table, &record)?;
        }
        txn.commit()?;

        tracing::info!(id = %record.id, title = %record.title, "created title");
        Ok(record)
    }

    pub fn get_title(&self, id: &str) -> Result<Option<TitleRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TITLES)?;
        load_title(&table, id)
    }

    /// Titles matching the optional genre and status, most recently updated
    /// first.
    pub fn list_titles(&self, query: &TitleListQuery) -> Result<TitleList> {
        let page = query.page.max(1);
        let limit = query.limit.max(1);

        let mut matching = Vec::new();
        for record in self.all_titles()? {
            let wrong_genre = query.genre.as_ref().is_some_and(|genre| {
                !record.genres.iter().any(|g| g.eq_ignore_ascii_case(genre))
            });
            if wrong_genre {
                continue;
            }
            if query.status.is_some_and(|s| s != record.status) {
                continue;
            }
            matching.push(record);
        }

        matching.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len();
        let items = matching
            .iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(TitleRecord::summary)
            .collect();

        Ok(TitleList {
            items,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Every title in key order.
    pub fn all_titles(&self) -> Result<Vec<TitleRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TITLES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Fetch a title for display, counting the view unless `skip_view`.
    pub fn record_view(
        &self,
        id: &str,
        skip_view: bool,
    ) -> Result<TitleRecord> {
        if skip_view {
            return self
                .get_title(id)?
                .ok_or_else(|| Error::not_found("title", id));
        }

        let txn = self.db.begin_write()?;
        let record = {
            let mut table = txn.open_table(TITLES)?;
            let mut record = require_title(&table, id)?;
            record.stats.views += 1;
            put_title(&mut table, &record)?;
            record
        };
        txn.commit()?;
        Ok(record)
    }

    /// Remove a title with its chapters, ratings and bookmarks.
    pub fn remove_title(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut titles = txn.open_table(TITLES)?;
            if titles.remove(id)?.is_none() {
                false
            } else {
                let mut chapters = txn.open_table(CHAPTERS)?;
                let mut chapter_ids = Vec::new();
                for entry in chapters.iter()? {
                    let (k, v) = entry?;
                    let chapter: Chapter = serde_json::from_slice(v.value())?;
                    if chapter.title_id == id {
                        chapter_ids.push(k.value().to_string());
                    }
                }
                for chapter_id in &chapter_ids {
                    chapters.remove(chapter_id.as_str())?;
                }

                let mut ratings = txn.open_table(RATINGS)?;
                let mut raters = Vec::new();
                for entry in ratings.iter()? {
                    let (k, _v) = entry?;
                    let (title_id, user_id) = k.value();
                    if title_id == id {
                        raters.push(user_id.to_string());
                    }
                }
                for user_id in &raters {
                    ratings.remove((id, user_id.as_str()))?;
                }

                let mut bookmarks = txn.open_table(BOOKMARKS)?;
                let mut readers = Vec::new();
                for entry in bookmarks.iter()? {
                    let (k, _v) = entry?;
                    let (user_id, title_id) = k.value();
                    if title_id == id {
                        readers.push(user_id.to_string());
                    }
                }
                for user_id in &readers {
                    bookmarks.remove((user_id.as_str(), id))?;
                }

                tracing::info!(
                    id,
                    chapters = chapter_ids.len(),
                    ratings = raters.len(),
                    bookmarks = readers.len(),
                    "removed title"
                );
                true
            }
        };
        txn.commit()?;
        Ok(removed)
    }

    // -- Chapters --

    pub fn add_chapter(
        &self,
        title_id: &str,
        input: NewChapter,
    ) -> Result<Chapter> {
        if !input.number.is_finite() || input.number < 0.0 {
            return Err(Error::InvalidRequest(format!(
                "chapter number must be a non-negative number, got {}",
                input.number
            )));
        }

        let now = Utc::now();
        let txn = self.db.begin_write()?;
        let chapter = {
            let mut titles = txn.open_table(TITLES)?;
            let mut title = require_title(&titles, title_id)?;

            let mut chapters = txn.open_table(CHAPTERS)?;
            for entry in chapters.iter()? {
                let (_k, v) = entry?;
                let existing: Chapter = serde_json::from_slice(v.value())?;
                if existing.title_id == title_id
                    && existing.number == input.number
                {
                    return Err(Error::Conflict(format!(
                        "chapter {} already exists for title {title_id}",
                        input.number
                    )));
                }
            }

            let chapter = Chapter {
                id: uuid::Uuid::new_v4().to_string(),
                title_id: title_id.to_string(),
                number: input.number,
                name: input.name,
                pages: input.pages,
                created_at: now,
            };
            let bytes = serde_json::to_vec(&chapter)?;
            chapters.insert(chapter.id.as_str(), bytes.as_slice())?;

            title.last_updated = now;
            put_title(&mut titles, &title)?;
            chapter
        };
        txn.commit()?;
        Ok(chapter)
    }

    /// Remove a chapter, clearing any last-read pointers that reference it.
    pub fn remove_chapter(&self, id: &str) -> Result<bool> {
        let now = Utc::now();
        let txn = self.db.begin_write()?;
        let removed = {
            let mut chapters = txn.open_table(CHAPTERS)?;
            let chapter = match chapters.remove(id)? {
                Some(v) => serde_json::from_slice::<Chapter>(v.value())?,
                None => return Ok(false),
            };

            let mut titles = txn.open_table(TITLES)?;
            if let Some(mut title) = load_title(&titles, &chapter.title_id)? {
                title.last_updated = now;
                put_title(&mut titles, &title)?;
            }

            let mut bookmarks = txn.open_table(BOOKMARKS)?;
            let mut stale = Vec::new();
            for entry in bookmarks.iter()? {
                let (_k, v) = entry?;
                let bookmark: Bookmark = serde_json::from_slice(v.value())?;
                if bookmark.last_read_chapter.as_deref() == Some(id) {
                    stale.push(bookmark);
                }
            }
            for mut bookmark in stale {
                bookmark.last_read_chapter = None;
                bookmark.updated_at = now;
                put_bookmark(&mut bookmarks, &bookmark)?;
            }
            true
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Chapters of a title ordered by chapter number.
    pub fn list_chapters(&self, title_id: &str) -> Result<Vec<Chapter>> {
        let txn = self.db.begin_read()?;
        let titles = txn.open_table(TITLES)?;
        require_title(&titles, title_id)?;

        let table = txn.open_table(CHAPTERS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            let chapter: Chapter = serde_json::from_slice(v.value())?;
            if chapter.title_id == title_id {
                result.push(chapter);
            }
        }
        result.sort_by(|a, b| a.number.total_cmp(&b.number));
        Ok(result)
    }

    // -- Ratings --

    /// Create or replace the caller's rating of a title.
    ///
    /// The stored rating and the title's aggregate change in one
    /// transaction.
    pub fn rate_title(
        &self,
        principal: &Principal,
        title_id: &str,
        value: u8,
    ) -> Result<TitleStats> {
        require_active(principal)?;
        let value = rating::validate(value)?;

        let txn = self.db.begin_write()?;
        let stats = {
            let mut titles = txn.open_table(TITLES)?;
            let mut title = require_title(&titles, title_id)?;

            let mut ratings = txn.open_table(RATINGS)?;
            let key = (title_id, principal.user_id.as_str());
            let previous = ratings.get(key)?.map(|v| v.value());
            match previous {
                Some(old) => {
                    rating::apply_update(&mut title.stats, old, value)
                }
                None => rating::apply_new(&mut title.stats, value),
            }
            ratings.insert(key, value)?;

            put_title(&mut titles, &title)?;
            title.stats
        };
        txn.commit()?;
        Ok(stats)
    }

    pub fn get_rating(
        &self,
        principal: &Principal,
        title_id: &str,
    ) -> Result<Option<u8>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RATINGS)?;
        Ok(table
            .get((title_id, principal.user_id.as_str()))?
            .map(|v| v.value()))
    }

    /// Withdraw the caller's rating. Returns the updated aggregate, or
    /// `None` when there was nothing to remove.
    pub fn remove_rating(
        &self,
        principal: &Principal,
        title_id: &str,
    ) -> Result<Option<TitleStats>> {
        require_active(principal)?;

        let txn = self.db.begin_write()?;
        let stats = {
            let mut ratings = txn.open_table(RATINGS)?;
            let removed = ratings
                .remove((title_id, principal.user_id.as_str()))?
                .map(|v| v.value());
            match removed {
                None => None,
                Some(value) => {
                    let mut titles = txn.open_table(TITLES)?;
                    let mut title = require_title(&titles, title_id)?;
                    rating::apply_remove(&mut title.stats, value);
                    put_title(&mut titles, &title)?;
                    Some(title.stats)
                }
            }
        };
        txn.commit()?;
        Ok(stats)
    }

    // -- Bookmarks --

    pub fn add_bookmark(
        &self,
        principal: &Principal,
        title_id: &str,
        last_read_chapter: Option<String>,
    ) -> Result<Bookmark> {
        require_active(principal)?;

        let now = Utc::now();
        let txn = self.db.begin_write()?;
        let bookmark = {
            let mut titles = txn.open_table(TITLES)?;
            let mut title = require_title(&titles, title_id)?;

            let chapters = txn.open_table(CHAPTERS)?;
            check_chapter_belongs(
                &chapters,
                last_read_chapter.as_deref(),
                title_id,
            )?;

            let mut bookmarks = txn.open_table(BOOKMARKS)?;
            if load_bookmark(&bookmarks, &principal.user_id, title_id)?
                .is_some()
            {
                return Err(Error::Conflict(format!(
                    "title {title_id} is already bookmarked"
                )));
            }

            let bookmark = Bookmark {
                user_id: principal.user_id.clone(),
                title_id: title_id.to_string(),
                last_read_chapter,
                created_at: now,
                updated_at: now,
            };
            put_bookmark(&mut bookmarks, &bookmark)?;

            title.stats.bookmark_count += 1;
            put_title(&mut titles, &title)?;
            bookmark
        };
        txn.commit()?;
        Ok(bookmark)
    }

    /// Move the caller's last-read pointer for a bookmarked title.
    pub fn update_bookmark(
        &self,
        principal: &Principal,
        title_id: &str,
        last_read_chapter: Option<String>,
    ) -> Result<Bookmark> {
        require_active(principal)?;

        let txn = self.db.begin_write()?;
        let bookmark = {
            let chapters = txn.open_table(CHAPTERS)?;
            check_chapter_belongs(
                &chapters,
                last_read_chapter.as_deref(),
                title_id,
            )?;

            let mut bookmarks = txn.open_table(BOOKMARKS)?;
            let mut bookmark =
                load_bookmark(&bookmarks, &principal.user_id, title_id)?
                    .ok_or_else(|| Error::not_found("bookmark", title_id))?;
            bookmark.last_read_chapter = last_read_chapter;
            bookmark.updated_at = Utc::now();
            put_bookmark(&mut bookmarks, &bookmark)?;
            bookmark
        };
        txn.commit()?;
        Ok(bookmark)
    }

    pub fn remove_bookmark(
        &self,
        principal: &Principal,
        title_id: &str,
    ) -> Result<bool> {
        require_active(principal)?;

        let txn = self.db.begin_write()?;
        let removed = {
            let mut bookmarks = txn.open_table(BOOKMARKS)?;
            let removed = bookmarks
                .remove((principal.user_id.as_str(), title_id))?
                .is_some();
            if removed {
                let mut titles = txn.open_table(TITLES)?;
                if let Some(mut title) = load_title(&titles, title_id)? {
                    title.stats.bookmark_count =
                        title.stats.bookmark_count.saturating_sub(1);
                    put_title(&mut titles, &title)?;
                }
            }
            removed
        };
        txn.commit()?;
        Ok(removed)
    }

    /// The caller's bookmarks, newest first.
    pub fn list_bookmarks(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Bookmark>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BOOKMARKS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let (user_id, _title_id) = k.value();
            if user_id == principal.user_id {
                result.push(serde_json::from_slice::<Bookmark>(v.value())?);
            }
        }
        result.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.title_id.cmp(&b.title_id))
        });
        Ok(result)
    }

    // -- Status --

    pub fn counts(&self) -> Result<CatalogCounts> {
        let txn = self.db.begin_read()?;
        let mut counts = CatalogCounts::default();

        for entry in txn.open_table(TITLES)?.iter()? {
            entry?;
            counts.titles += 1;
        }
        for entry in txn.open_table(CHAPTERS)?.iter()? {
            entry?;
            counts.chapters += 1;
        }
        for entry in txn.open_table(RATINGS)?.iter()? {
            entry?;
            counts.ratings += 1;
        }
        for entry in txn.open_table(BOOKMARKS)?.iter()? {
            entry?;
            counts.bookmarks += 1;
        }
        Ok(counts)
    }
}

impl TitleStore for CatalogDb {
    fn find_where(
        &self,
        filter: &TitleFilter,
        limit: Option<usize>,
    ) -> Result<Vec<TitleRecord>> {
        let matcher = filter.compile()?;

        let txn = self.db.begin_read()?;
        let table = txn.open_table(TITLES)?;
        let records = table.iter()?.map(|entry| -> Result<TitleRecord> {
            let (_k, v) = entry?;
            Ok(serde_json::from_slice(v.value())?)
        });
        matcher.fill_pool(records, limit.unwrap_or(usize::MAX))
    }

    fn count(&self, filter: &TitleFilter) -> Result<usize> {
        let matcher = filter.compile()?;

        let txn = self.db.begin_read()?;
        let table = txn.open_table(TITLES)?;
        let mut count = 0;
        for entry in table.iter()? {
            let (_k, v) = entry?;
            let record: TitleRecord = serde_json::from_slice(v.value())?;
            if matcher.matches(&record) {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb").finish_non_exhaustive()
    }
}
