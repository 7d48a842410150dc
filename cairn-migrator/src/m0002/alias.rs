use indexmap::IndexMap;

/// camelCase alias of a display name: `"Content Settings"` becomes
/// `"contentSettings"`. Leading digits are dropped and an empty result falls
/// back to `"group"`.
pub fn to_safe_alias(text: &str) -> String {
    let mut alias = String::with_capacity(text.len());

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut chars = word.chars();
        let Some(first) = chars.next() else {
            continue;
        };

        if alias.is_empty() {
            alias.extend(first.to_lowercase());
        } else {
            alias.extend(first.to_uppercase());
        }
        alias.push_str(chars.as_str());
    }

    let alias = alias.trim_start_matches(|c: char| c.is_ascii_digit());
    let mut chars = alias.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => "group".to_owned(),
    }
}

/// Assigns an alias to every `(id, text)` row.
///
/// Rows are grouped by safe alias in first-seen order, then by their exact
/// text in first-seen order. The first text of an alias keeps it, the
/// following ones get `2`, `3`... appended. Rows sharing a text share an
/// alias. The result follows that grouping, so the same input always yields
/// the same aliases.
pub fn generate_group_aliases(rows: &[(i64, String)]) -> Vec<(i64, String)> {
    let mut groups: IndexMap<String, IndexMap<&str, Vec<i64>>> = IndexMap::new();
    for (id, text) in rows {
        groups
            .entry(to_safe_alias(text))
            .or_default()
            .entry(text.as_str())
            .or_default()
            .push(*id);
    }

    let mut aliases = Vec::with_capacity(rows.len());
    for (alias, texts) in groups {
        for (n, ids) in texts.into_values().enumerate() {
            let alias = match n {
                0 => alias.clone(),
                n => format!("{alias}{}", n + 1),
            };
            aliases.extend(ids.into_iter().map(|id| (id, alias.clone())));
        }
    }

    aliases
}
