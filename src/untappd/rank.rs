fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Index of the choice closest to `query`, ignoring case. Only a choice
/// closer than the query length can displace the first one.
pub fn best_match<S: AsRef<str>>(query: &str, choices: impl IntoIterator<Item = S>) -> usize {
    let query = query.to_lowercase();
    let mut best_idx = 0;
    let mut best_distance = query.chars().count();
    for (i, choice) in choices.into_iter().enumerate() {
        let distance = edit_distance(&query, &choice.as_ref().to_lowercase());
        if distance < best_distance {
            best_idx = i;
            best_distance = distance;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("ビール", "ビール"), 0);
        assert_eq!(edit_distance("ビール", "ビア"), 2);
    }

    #[test]
    fn picks_closest_choice() {
        let choices = [
            "Mikkeller Beer Geek Brunch Weasel",
            "Mikkeller Beer Geek Breakfast",
            "Mikkeller Beer Geek Vanilla Shake",
        ];
        assert_eq!(best_match("mikkeller beer geek breakfast", choices), 1);
    }

    #[test]
    fn ties_keep_first_and_far_choices_default_to_zero() {
        assert_eq!(best_match("abc", ["abd", "abe"]), 0);
        assert_eq!(best_match("ipa", ["completely different", "another one"]), 0);
    }
}
