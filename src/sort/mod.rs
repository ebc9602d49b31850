//! Deterministic ordering of extracted tiles.
//!
//! Sorting is stable: records that compare equal under every key keep their
//! input order. Sorting only computes `sort_index`; applying the order to the
//! page is the presentation stage's job.

use std::cmp::Ordering;

use crate::models::{SortDirection, SortKey, SortSpec, Tile};

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Case-insensitive name comparison.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a = a.chars().flat_map(char::to_lowercase);
    let b = b.chars().flat_map(char::to_lowercase);
    Iterator::cmp(a, b)
}

/// Comparator for `spec`.
pub fn comparator(spec: &SortSpec) -> impl Fn(&Tile, &Tile) -> Ordering + use<> {
    let spec = *spec;
    move |a: &Tile, b: &Tile| match spec.key {
        SortKey::Alphabetical => directed(compare_names(&a.display_name, &b.display_name), spec.direction),
        SortKey::Mileage => directed(a.reward_value.cmp(&b.reward_value), spec.direction),
        SortKey::MileageThenMerchant => directed(a.reward_value.cmp(&b.reward_value), spec.direction).then_with(|| {
            directed(
                compare_names(&a.display_name, &b.display_name),
                spec.secondary_direction.unwrap_or(SortDirection::Ascending),
            )
        }),
    }
}

/// Sorted copy of `records` with `sort_index` set to 0..n in output order.
pub fn sort_tiles(records: &[Tile], spec: &SortSpec) -> Vec<Tile> {
    let mut sorted = records.to_vec();
    sorted.sort_by(comparator(spec));
    for (index, tile) in sorted.iter_mut().enumerate() {
        tile.sort_index = index;
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    fn tiles(data: &[(&str, u64)]) -> Vec<Tile> {
        let mut doc = Document::new();
        data.iter()
            .map(|&(name, value)| Tile {
                node: doc.create_element("div"),
                merchant_key: name.to_lowercase(),
                display_name: name.to_string(),
                reward_text: format!("{value} miles"),
                reward_value: value,
                sort_index: 0,
            })
            .collect()
    }

    fn names(tiles: &[Tile]) -> Vec<&str> {
        tiles.iter().map(|t| t.display_name.as_str()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(sort_tiles(&[], &SortSpec::new(SortKey::Mileage, SortDirection::Descending)).is_empty());
    }

    #[test]
    fn test_mileage_descending_indices() {
        let input = tiles(&[("A", 500), ("B", 5000), ("C", 0), ("D", 2000), ("E", 5000)]);
        let sorted = sort_tiles(&input, &SortSpec::new(SortKey::Mileage, SortDirection::Descending));

        assert_eq!(names(&sorted), vec!["B", "E", "D", "A", "C"]);
        assert!(sorted.windows(2).all(|w| w[0].sort_index < w[1].sort_index));
        assert!(sorted.windows(2).all(|w| w[0].reward_value >= w[1].reward_value));
        assert_eq!(sorted.iter().map(|t| t.sort_index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_input_untouched() {
        let input = tiles(&[("A", 1), ("B", 2)]);
        let before = input.clone();
        sort_tiles(&input, &SortSpec::new(SortKey::Mileage, SortDirection::Descending));
        assert_eq!(input, before);
    }

    #[test]
    fn test_alphabetical_is_case_insensitive_and_stable() {
        let input = tiles(&[("banana", 1), ("Apple", 2), ("apple", 3), ("Cherry", 4)]);

        let asc = sort_tiles(&input, &SortSpec::new(SortKey::Alphabetical, SortDirection::Ascending));
        assert_eq!(names(&asc), vec!["Apple", "apple", "banana", "Cherry"]);

        let desc = sort_tiles(&input, &SortSpec::new(SortKey::Alphabetical, SortDirection::Descending));
        assert_eq!(names(&desc), vec!["Cherry", "banana", "Apple", "apple"]);
    }

    #[test]
    fn test_mileage_then_merchant() {
        let input = tiles(&[("Zappos", 3000), ("Adidas", 3000), ("Macys", 5000), ("Nike", 3000)]);

        let spec = SortSpec::new(SortKey::MileageThenMerchant, SortDirection::Descending);
        assert_eq!(names(&sort_tiles(&input, &spec)), vec!["Macys", "Adidas", "Nike", "Zappos"]);

        let spec = spec.with_secondary(SortDirection::Descending);
        assert_eq!(names(&sort_tiles(&input, &spec)), vec!["Macys", "Zappos", "Nike", "Adidas"]);
    }

    #[test]
    fn test_all_equal_preserves_order() {
        let input = tiles(&[("Same", 7), ("Same", 7), ("Same", 7)]);
        let sorted = sort_tiles(&input, &SortSpec::new(SortKey::MileageThenMerchant, SortDirection::Ascending));

        let nodes: Vec<_> = sorted.iter().map(|t| t.node).collect();
        let expected: Vec<_> = input.iter().map(|t| t.node).collect();
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_unknown_key_sorts_by_mileage() {
        let input = tiles(&[("A", 1), ("B", 3), ("C", 2)]);
        let spec = SortSpec::parse_lossy("popularity", "desc");
        assert_eq!(names(&sort_tiles(&input, &spec)), vec!["B", "C", "A"]);
    }
}
