// Forum domain - query params, paging and post validation
use serde::Deserialize;

use crate::db::models::ForumCategory;

/// `GET /forum/` query. Every field stays a string so bad input degrades
/// instead of failing the request.
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
}

impl ListParams {
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Unknown categories are ignored.
    pub fn category(&self) -> Option<ForumCategory> {
        self.category.as_deref().and_then(|c| c.parse().ok())
    }

    pub fn requested_page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .unwrap_or(1)
    }
}

/// Escape LIKE wildcards so user text matches literally (`ESCAPE '\'`).
pub fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// One page of a result set. There is always at least one page, and a
/// request past the end lands on the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl Page {
    pub fn resolve(requested: usize, size: usize, total_items: usize) -> Self {
        let size = size.max(1);
        let total_pages = total_items.div_ceil(size).max(1);
        let number = requested.clamp(1, total_pages);
        Self {
            number,
            size,
            total_items,
            total_pages,
        }
    }

    pub fn offset(&self) -> usize {
        (self.number - 1) * self.size
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn previous(&self) -> usize {
        self.number.saturating_sub(1).max(1)
    }

    pub fn next(&self) -> usize {
        (self.number + 1).min(self.total_pages)
    }
}

/// Submitted forum post form.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct PostDraftForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub is_notice: Option<String>,
}

/// A validated post, ready to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub category: ForumCategory,
    pub is_notice: bool,
}

impl PostDraftForm {
    /// Only superusers may pin notices; anyone else's flag is dropped.
    pub fn validate(&self, is_superuser: bool) -> Result<PostDraft, Vec<String>> {
        let mut errors = Vec::new();

        let title = self.title.trim();
        let title_len = title.chars().count();
        if title_len == 0 {
            errors.push("Title is required.".to_string());
        } else if title_len > 200 {
            errors.push("Title must be at most 200 characters.".to_string());
        }

        let content = self.content.trim();
        if content.is_empty() {
            errors.push("Content is required.".to_string());
        }

        let category = if self.category.trim().is_empty() {
            ForumCategory::default()
        } else {
            match self.category.trim().parse() {
                Ok(category) => category,
                Err(_) => {
                    errors.push("Choose a valid category.".to_string());
                    ForumCategory::default()
                }
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(PostDraft {
            title: title.to_string(),
            content: content.to_string(),
            category,
            is_notice: is_superuser && self.is_notice.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<&str>) -> ListParams {
        ListParams {
            page: page.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn page_number_follows_paginator_rules() {
        assert_eq!(params(None).requested_page(), 1);
        assert_eq!(params(Some("abc")).requested_page(), 1);
        assert_eq!(params(Some("3")).requested_page(), 3);

        assert_eq!(Page::resolve(0, 10, 25).number, 1);
        assert_eq!(Page::resolve(99, 10, 25).number, 3);
        let empty = Page::resolve(5, 10, 0);
        assert_eq!((empty.number, empty.total_pages), (1, 1));
        assert!(!empty.has_next() && !empty.has_previous());
    }

    #[test]
    fn page_offsets_and_neighbours() {
        let page = Page::resolve(2, 10, 25);
        assert_eq!(page.offset(), 10);
        assert!(page.has_previous() && page.has_next());
        assert_eq!((page.previous(), page.next()), (1, 3));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_done\\"), "%100\\%\\_done\\\\%");
    }

    #[test]
    fn blank_search_and_unknown_category_are_ignored() {
        let params = ListParams {
            search: Some("   ".into()),
            category: Some("memes".into()),
            page: None,
        };
        assert_eq!(params.search(), None);
        assert_eq!(params.category(), None);

        let params = ListParams {
            category: Some("tip".into()),
            ..Default::default()
        };
        assert_eq!(params.category(), Some(ForumCategory::Tip));
    }

    #[test]
    fn notice_flag_requires_superuser() {
        let form = PostDraftForm {
            title: "Read me".into(),
            content: "Rules".into(),
            category: "general".into(),
            is_notice: Some("on".into()),
        };
        assert!(!form.validate(false).unwrap().is_notice);
        assert!(form.validate(true).unwrap().is_notice);
    }

    #[test]
    fn draft_validation_reports_every_problem() {
        let form = PostDraftForm {
            title: " ".into(),
            content: "".into(),
            category: "memes".into(),
            is_notice: None,
        };
        assert_eq!(form.validate(false).unwrap_err().len(), 3);

        let long = PostDraftForm {
            title: "t".repeat(201),
            content: "body".into(),
            ..Default::default()
        };
        assert_eq!(long.validate(false).unwrap_err().len(), 1);
    }
}
