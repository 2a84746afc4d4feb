//! Search-area derivation and random sampling
//!
//! Pure helpers with no I/O, generic over the random source so tests can
//! seed it.

use crate::model::{LATITUDE_RANGE, LONGITUDE_RANGE};
use rand::Rng;

/// Rectangular search area in decimal degrees
///
/// Edges are clamped independently to the valid coordinate ranges, so the box
/// shrinks (and loses symmetry) near the poles and the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_longitude: f64,
    pub min_latitude: f64,
    pub max_longitude: f64,
    pub max_latitude: f64,
}

impl BoundingBox {
    pub fn around(latitude: f64, longitude: f64, half_width: f64, half_height: f64) -> Self {
        Self {
            min_longitude: (longitude - half_width).max(LONGITUDE_RANGE.0),
            min_latitude: (latitude - half_height).max(LATITUDE_RANGE.0),
            max_longitude: (longitude + half_width).min(LONGITUDE_RANGE.1),
            max_latitude: (latitude + half_height).min(LATITUDE_RANGE.1),
        }
    }

    /// `minLon,minLat,maxLon,maxLat`
    pub fn to_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_longitude, self.min_latitude, self.max_longitude, self.max_latitude
        )
    }
}

/// Uniform page in `[1, pages]`; `None` when there are no pages
pub fn select_page<R: Rng + ?Sized>(rng: &mut R, pages: u32) -> Option<u32> {
    if pages == 0 {
        return None;
    }
    Some(rng.gen_range(1..=pages))
}

/// Random contiguous window of `size` items, or all items if fewer
///
/// The start index is uniform over `[0, len - size]`, inclusive of both
/// ends, so a list of exactly `size` items yields the whole list.
pub fn sample_window<T, R: Rng + ?Sized>(rng: &mut R, mut items: Vec<T>, size: usize) -> Vec<T> {
    if items.len() <= size {
        return items;
    }
    let start = rng.gen_range(0..=items.len() - size);
    items.truncate(start + size);
    items.drain(..start);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bbox_clamps_high_side_near_pole() {
        let bbox = BoundingBox::around(89.5, 179.5, 1.0, 1.0);
        assert_eq!(
            (bbox.min_longitude, bbox.min_latitude, bbox.max_longitude, bbox.max_latitude),
            (178.5, 88.5, 180.0, 90.0)
        );
    }

    #[test]
    fn test_bbox_clamps_low_side() {
        let bbox = BoundingBox::around(-90.0, -180.0, 1.0, 1.0);
        assert_eq!(bbox.to_param(), "-180,-90,-179,-89");
    }

    #[test]
    fn test_bbox_param_order() {
        let bbox = BoundingBox::around(45.0, 78.0, 1.0, 1.0);
        assert_eq!(bbox.to_param(), "77,44,79,46");
    }

    #[test]
    fn test_page_selection_is_uniform_and_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0u32; 10];
        let draws = 100_000;

        for _ in 0..draws {
            let page = select_page(&mut rng, 10).unwrap();
            assert!((1..=10).contains(&page));
            counts[(page - 1) as usize] += 1;
        }

        // Expect ~10_000 each; allow a generous band
        for (i, count) in counts.iter().enumerate() {
            assert!(
                (9_000..=11_000).contains(count),
                "page {} drawn {} times",
                i + 1,
                count
            );
        }
    }

    #[test]
    fn test_single_page_and_no_pages() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_page(&mut rng, 1), Some(1));
        assert_eq!(select_page(&mut rng, 0), None);
    }

    #[test]
    fn test_window_is_contiguous_and_exact_size() {
        let mut rng = StdRng::seed_from_u64(42);
        let items: Vec<usize> = (0..250).collect();

        for _ in 0..200 {
            let window = sample_window(&mut rng, items.clone(), 20);
            assert_eq!(window.len(), 20);
            assert!(window[0] <= 230);
            assert!(window.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn test_window_start_covers_both_ends() {
        let mut rng = StdRng::seed_from_u64(3);
        let items: Vec<usize> = (0..25).collect();
        let mut seen = [false; 6];

        for _ in 0..2_000 {
            let window = sample_window(&mut rng, items.clone(), 20);
            seen[window[0]] = true;
        }

        assert!(seen.iter().all(|s| *s), "start indices seen: {:?}", seen);
    }

    #[test]
    fn test_window_start_is_uniform_over_full_page() {
        let mut rng = StdRng::seed_from_u64(13);
        let items: Vec<usize> = (0..250).collect();
        // 231 possible starts in 11 buckets of 21
        let mut buckets = [0u32; 11];
        let mut lowest = usize::MAX;
        let mut highest = 0;

        for _ in 0..110_000 {
            let window = sample_window(&mut rng, items.clone(), 20);
            let start = window[0];
            assert_eq!(window, (start..start + 20).collect::<Vec<_>>());
            assert!(start <= 230);
            lowest = lowest.min(start);
            highest = highest.max(start);
            buckets[start / 21] += 1;
        }

        assert_eq!((lowest, highest), (0, 230));
        for (i, count) in buckets.iter().enumerate() {
            assert!(
                (9_000..=11_000).contains(count),
                "starts {}..={} drawn {} times",
                i * 21,
                i * 21 + 20,
                count
            );
        }
    }

    #[test]
    fn test_short_list_returned_unmodified() {
        let mut rng = StdRng::seed_from_u64(9);
        let items = vec!["e", "d", "c", "b", "a"];
        assert_eq!(sample_window(&mut rng, items.clone(), 20), items);
    }

    #[test]
    fn test_exact_size_list_returned_whole() {
        let mut rng = StdRng::seed_from_u64(11);
        let items: Vec<u8> = (0..20).collect();
        assert_eq!(sample_window(&mut rng, items.clone(), 20), items);
    }
}
