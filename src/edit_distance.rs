//! Closest-match lookup for misspelled names, in the style of the
//! compiler's suggestion machinery.

/// Finds the candidate closest to `name`, if any is within `dist` edits
/// (default: a third of the name's length).
pub fn find_best_match_for_name(
    candidates: &[&str],
    name: &str,
    dist: Option<usize>,
) -> Option<String> {
    let limit = dist.unwrap_or_else(|| std::cmp::max(name.len(), 3) / 3);

    if let Some(exact) = candidates
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
    {
        return Some(exact.to_string());
    }

    candidates
        .iter()
        .filter_map(|c| {
            let d = edit_distance(c, name);
            (d <= limit).then_some((d, *c))
        })
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(edit_distance("builders", "builders"), 0);
        assert_eq!(edit_distance("builders", "bulders"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn suggests_close_names_only() {
        let candidates = ["builders", "provisioners", "variables"];
        assert_eq!(
            find_best_match_for_name(&candidates, "bulders", Some(3)),
            Some("builders".to_string())
        );
        assert_eq!(
            find_best_match_for_name(&candidates, "Builders", Some(3)),
            Some("builders".to_string())
        );
        assert_eq!(find_best_match_for_name(&candidates, "push", Some(3)), None);
    }
}
