//! Cover / interior / back-cover pagination for desktop spreads
//!
//! Page 1 sits alone on the right (cover), the last page sits alone on the
//! left (back cover), and everything in between is laid out two by two.

use super::types::PageNumber;

/// Pages visible together in desktop mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Spread {
    pub index: usize,
    pub left: Option<PageNumber>,
    pub right: Option<PageNumber>,
}

impl Spread {
    #[must_use]
    pub const fn new(index: usize, left: Option<PageNumber>, right: Option<PageNumber>) -> Self {
        Self { index, left, right }
    }

    /// Visible pages, left to right
    pub fn pages(&self) -> impl Iterator<Item = PageNumber> {
        self.left.into_iter().chain(self.right)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Number of spreads a document of `total_pages` is laid out in
#[must_use]
pub fn spread_count(total_pages: u32) -> usize {
    match total_pages {
        0 => 0,
        1 => 1,
        2 => 2,
        n => {
            let interior_spreads = (n - 2).div_ceil(2) as usize;
            1 + interior_spreads + 1
        }
    }
}

/// Pages shown by spread `index`. Out-of-range indices yield an empty spread.
#[must_use]
pub fn pages_of(total_pages: u32, index: usize) -> Spread {
    if total_pages == 0 {
        return Spread::new(index, None, None);
    }
    if total_pages == 1 || index == 0 {
        return Spread::new(index, None, Some(1));
    }

    let count = spread_count(total_pages);
    if index == count - 1 {
        return Spread::new(index, Some(total_pages), None);
    }
    if index >= count {
        return Spread::new(index, None, None);
    }

    // The last page is reserved for the back cover
    let max_interior = total_pages - 1;
    let left = 2 + (index as u32 - 1) * 2;
    let right = left + 1;

    Spread::new(
        index,
        (left <= max_interior).then_some(left),
        (right <= max_interior).then_some(right),
    )
}

/// Every spread of the document in order
pub fn spreads(total_pages: u32) -> impl Iterator<Item = Spread> {
    (0..spread_count(total_pages)).map(move |index| pages_of(total_pages, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(total_pages: u32) -> Vec<(Option<u32>, Option<u32>)> {
        spreads(total_pages).map(|s| (s.left, s.right)).collect()
    }

    #[test]
    fn empty_document_has_no_spreads() {
        assert_eq!(spread_count(0), 0);
        assert!(layout(0).is_empty());
        assert!(pages_of(0, 0).is_empty());
    }

    #[test]
    fn single_page_is_right_only() {
        assert_eq!(spread_count(1), 1);
        assert_eq!(pages_of(1, 0), Spread::new(0, None, Some(1)));
    }

    #[test]
    fn two_pages_are_cover_and_back_cover() {
        assert_eq!(spread_count(2), 2);
        assert_eq!(layout(2), vec![(None, Some(1)), (Some(2), None)]);
    }

    #[test]
    fn three_pages_have_a_single_interior_page() {
        assert_eq!(spread_count(3), 3);
        assert_eq!(
            layout(3),
            vec![(None, Some(1)), (Some(2), None), (Some(3), None)]
        );
    }

    #[test]
    fn five_page_fixture() {
        assert_eq!(spread_count(5), 4);
        assert_eq!(
            layout(5),
            vec![
                (None, Some(1)),
                (Some(2), Some(3)),
                (Some(4), None),
                (Some(5), None),
            ]
        );
    }

    #[test]
    fn large_even_document() {
        assert_eq!(spread_count(100), 51);
        assert_eq!(pages_of(100, 1), Spread::new(1, Some(2), Some(3)));
        assert_eq!(pages_of(100, 49), Spread::new(49, Some(98), Some(99)));
        assert_eq!(pages_of(100, 50), Spread::new(50, Some(100), None));
    }

    #[test]
    fn out_of_range_index_is_empty() {
        assert!(pages_of(5, 4).is_empty());
        assert!(pages_of(5, 99).is_empty());
    }

    #[test]
    fn every_page_appears_once_in_increasing_order() {
        for total in 0..=200u32 {
            let expected = match total {
                0 => 0,
                1 => 1,
                2 => 2,
                n => 1 + (n as usize - 2).div_ceil(2) + 1,
            };
            assert_eq!(spread_count(total), expected, "count for {total}");

            let pages: Vec<u32> = spreads(total)
                .flat_map(|s| s.pages().collect::<Vec<_>>())
                .collect();
            let all: Vec<u32> = (1..=total).collect();
            assert_eq!(pages, all, "layout for {total}");
        }
    }

    #[test]
    fn only_cover_and_back_cover_are_single_sided() {
        for total in 4..=60u32 {
            let count = spread_count(total);
            for spread in spreads(total) {
                let single = spread.left.is_none() || spread.right.is_none();
                let edge = spread.index == 0 || spread.index == count - 1;
                let last_interior = spread.index == count - 2;
                assert!(!single || edge || last_interior, "{total}: {spread:?}");
            }
        }
    }
}
