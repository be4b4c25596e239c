use crate::types::Candidate;

/// Numbered listing of `items`, one per line, numbers right aligned.
pub fn candidate_table(items: &[Candidate]) -> String {
    let width = items.len().to_string().len();
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut line = format!("{:>width$}  {}", idx + 1, item.label());
            if let Some((_, count)) = item.details.iter().find(|(k, _)| k == "episodes") {
                line.push_str(&format!("  [{count}]"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Two column table with the keys padded to the longest one.
pub fn rows_table(rows: &[(String, String)]) -> String {
    let width = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    rows.iter()
        .map(|(key, value)| format!("{key:<width$}  {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Title followed by every detail the provider attached.
pub fn details(item: &Candidate) -> String {
    let mut rows = vec![("title".to_string(), item.title.clone())];
    rows.extend(item.details.iter().cloned());
    if !item.url.is_empty() {
        rows.push(("url".to_string(), item.url.clone()));
    }
    rows_table(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateKind;

    #[test]
    fn numbers_are_aligned() {
        let items: Vec<_> = (1..=10)
            .map(|i| Candidate::new(CandidateKind::Episode, format!("Episode {i}")))
            .collect();
        let table = candidate_table(&items);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], " 1  Episode 1");
        assert_eq!(lines[9], "10  Episode 10");
    }

    #[test]
    fn details_lists_everything() {
        let item = Candidate::new(CandidateKind::Anime, "Lain")
            .with_detail("status", "Finished")
            .with_url("https://example.org/lain");
        assert_eq!(
            details(&item),
            "title   Lain\nstatus  Finished\nurl     https://example.org/lain"
        );
    }
}
