use std::collections::HashSet;

/// Split a free-text author list on `,` `/` `;`, trimming and dropping
/// case-insensitive duplicates while keeping first-seen order.
pub fn split_authors(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split([',', '/', ';'])
        .map(collapse_whitespace)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// Primary author: the mapped author when present, else the first listed name.
pub fn primary_author(mapped: Option<&str>, raw_list: Option<&str>) -> Option<String> {
    mapped
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .or_else(|| split_authors(raw_list?).into_iter().next())
}

/// Canonical author list for display (`A, B`), or None when nothing remains.
pub fn joined_authors(raw_list: Option<&str>) -> Option<String> {
    let names = split_authors(raw_list?);
    (!names.is_empty()).then(|| names.join(", "))
}

/// Trim text and map blank values to None.
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
