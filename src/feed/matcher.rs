//! Filter evaluation engine.
//!
//! Pure functions that decide whether fetched items pass a feed's filter
//! set. Include filters use OR logic (at least one must match), exclude
//! filters use veto logic (any match rejects the item). All matching is
//! case-insensitive.

use regex::RegexBuilder;

use super::fetcher::item_guid;
use super::types::{
    FeedFilter, FilterKind, FilterScope, MatchedItem, ParsedItem, MAX_DESCRIPTION_LENGTH,
};
use crate::{FeedwatchError, Result};

/// Check whether an item passes the given set of filters.
///
/// An empty filter set always passes. An item matching any exclude filter is
/// rejected regardless of includes; otherwise, if include filters exist, at
/// least one must match.
pub fn matches(item: &ParsedItem, filters: &[FeedFilter]) -> bool {
    if filters.is_empty() {
        return true;
    }

    let mut has_includes = false;
    let mut any_include_matched = false;

    for filter in filters {
        if filter.kind.is_include() {
            has_includes = true;
            if matches_filter(item, filter) {
                any_include_matched = true;
            }
        } else if matches_filter(item, filter) {
            return false;
        }
    }

    !has_includes || any_include_matched
}

fn matches_filter(item: &ParsedItem, filter: &FeedFilter) -> bool {
    let text = text_for_scope(item, filter.scope);
    match filter.kind {
        FilterKind::Include | FilterKind::Exclude => {
            text.contains(&filter.value.to_lowercase())
        }
        FilterKind::IncludeRegex | FilterKind::ExcludeRegex => {
            // A malformed pattern never matches: it cannot admit an item
            // through an include, and it cannot veto one through an exclude.
            match RegexBuilder::new(&filter.value).case_insensitive(true).build() {
                Ok(re) => re.is_match(&text),
                Err(_) => false,
            }
        }
    }
}

fn text_for_scope(item: &ParsedItem, scope: FilterScope) -> String {
    match scope {
        FilterScope::Title => item.title.to_lowercase(),
        FilterScope::Content => item.description.to_lowercase(),
        FilterScope::All => format!("{} {}", item.title, item.description).to_lowercase(),
    }
}

/// Check whether a pattern is accepted by the case-insensitive regex engine.
///
/// Used before persisting a regex filter, so broken patterns are rejected at
/// creation time instead of silently never matching.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| FeedwatchError::Validation(format!("invalid regex: {e}")))?;
    Ok(())
}

/// Apply filters to fetched items, keeping source order.
///
/// Surviving items get their description truncated for delivery and their
/// GUID derived.
pub fn filter_items(items: &[ParsedItem], filters: &[FeedFilter]) -> Vec<MatchedItem> {
    items
        .iter()
        .filter(|item| matches(item, filters))
        .map(|item| MatchedItem {
            title: item.title.clone(),
            description: truncate_description(&item.description),
            link: item.link.clone(),
            guid: item_guid(&item.raw_guid, &item.title, &item.link),
        })
        .collect()
}

/// Truncate a description for delivery, appending an ellipsis when cut.
fn truncate_description(text: &str) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_LENGTH {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_DESCRIPTION_LENGTH).collect();
    truncated.push_str("...");
    truncated
}
