use crate::error::SelectionError;

/// One flag per candidate of the current list, `true` meaning selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionMask(Vec<bool>);

impl SelectionMask {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|selected| **selected).count()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(idx, selected)| selected.then_some(idx))
    }

    /// Picks the selected items, in list order.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .zip(self.as_slice())
            .filter(|(_, selected)| **selected)
            .map(|(item, _)| item.clone())
            .collect()
    }
}

/// Parses `"5"`, `"1-3"` or `"1-3 5 7"` (1-based, inclusive) into a mask of
/// length `n`. Empty input selects nothing.
pub fn parse_selection_mask(text: &str, n: usize) -> Result<SelectionMask, SelectionError> {
    let mut mask = vec![false; n];

    for token in text.split_whitespace() {
        match token.split_once('-') {
            Some((start, end)) => {
                if end.contains('-') {
                    return Err(SelectionError::InvalidSelectionSyntax {
                        token: token.to_string(),
                        reason: "bad token",
                    });
                }
                if !is_digits(start) || !is_digits(end) {
                    return Err(SelectionError::InvalidSelectionSyntax {
                        token: token.to_string(),
                        reason: "bad range endpoints",
                    });
                }
                let a = bounded(start, token, n)?;
                let b = bounded(end, token, n)?;
                if a >= b {
                    return Err(SelectionError::InvalidRange {
                        token: token.to_string(),
                    });
                }
                mask[a - 1..b].iter_mut().for_each(|flag| *flag = true);
            }
            None => {
                if !is_digits(token) {
                    return Err(SelectionError::InvalidSelectionSyntax {
                        token: token.to_string(),
                        reason: "bad token",
                    });
                }
                let idx = bounded(token, token, n)?;
                mask[idx - 1] = true;
            }
        }
    }

    Ok(SelectionMask(mask))
}

pub fn is_digits(raw: &str) -> bool {
    !raw.is_empty() && raw.chars().all(|ch| ch.is_ascii_digit())
}

fn bounded(raw: &str, token: &str, n: usize) -> Result<usize, SelectionError> {
    match raw.parse::<usize>() {
        Ok(value) if (1..=n).contains(&value) => Ok(value),
        _ => Err(SelectionError::OutOfRange {
            token: token.to_string(),
            max: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(text: &str, n: usize) -> Vec<bool> {
        parse_selection_mask(text, n).unwrap().as_slice().to_vec()
    }

    #[test]
    fn mask_length_always_matches_candidates() {
        for n in 2..8 {
            for text in ["", "1", "1-2", "  1   1 ", "1 2"] {
                assert_eq!(parse_selection_mask(text, n).unwrap().len(), n);
            }
        }
    }

    #[test]
    fn single_index_selects_one_entry() {
        for n in 1..=6 {
            for k in 1..=n {
                let mask = flags(&k.to_string(), n);
                for (idx, flag) in mask.iter().enumerate() {
                    assert_eq!(*flag, idx == k - 1, "k={k} n={n}");
                }
            }
        }
    }

    #[test]
    fn range_is_inclusive() {
        let n = 6;
        for a in 1..n {
            for b in a + 1..=n {
                let mask = flags(&format!("{a}-{b}"), n);
                for (idx, flag) in mask.iter().enumerate() {
                    assert_eq!(*flag, idx + 1 >= a && idx < b, "{a}-{b}");
                }
            }
        }
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert_eq!(flags("", 4), vec![false; 4]);
        assert_eq!(flags("   \t ", 4), vec![false; 4]);
    }

    #[test]
    fn out_of_range_indices_fail() {
        assert!(matches!(
            parse_selection_mask("0", 5),
            Err(SelectionError::OutOfRange { max: 5, .. })
        ));
        assert!(matches!(
            parse_selection_mask("6", 5),
            Err(SelectionError::OutOfRange { max: 5, .. })
        ));
        assert!(matches!(
            parse_selection_mask("2-9", 5),
            Err(SelectionError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_selection_mask("99999999999999999999999", 5),
            Err(SelectionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn reversed_or_degenerate_range_fails() {
        assert_eq!(
            parse_selection_mask("3-2", 5),
            Err(SelectionError::InvalidRange {
                token: "3-2".into()
            })
        );
        assert!(matches!(
            parse_selection_mask("2-2", 5),
            Err(SelectionError::InvalidRange { .. })
        ));
    }

    #[test]
    fn syntax_errors_name_the_token() {
        let err = parse_selection_mask("1 abc", 5).unwrap_err();
        assert!(err.to_string().contains("abc"));
        assert!(matches!(
            parse_selection_mask("1-2-3", 5),
            Err(SelectionError::InvalidSelectionSyntax { .. })
        ));
        assert!(matches!(
            parse_selection_mask("-3", 5),
            Err(SelectionError::InvalidSelectionSyntax { .. })
        ));
        assert!(matches!(
            parse_selection_mask("+1", 5),
            Err(SelectionError::InvalidSelectionSyntax { .. })
        ));
    }

    #[test]
    fn repeated_tokens_are_idempotent() {
        assert_eq!(
            parse_selection_mask("1 1 1", 5),
            parse_selection_mask("1", 5)
        );
        assert_eq!(flags("1-3 2 5", 5), vec![true, true, true, false, true]);
    }

    #[test]
    fn apply_keeps_list_order() {
        let mask = parse_selection_mask("4 1-2", 5).unwrap();
        assert_eq!(mask.apply(&["a", "b", "c", "d", "e"]), vec!["a", "b", "d"]);
        assert_eq!(mask.count(), 3);
        assert_eq!(mask.indices().collect::<Vec<_>>(), vec![0, 1, 3]);
    }
}
