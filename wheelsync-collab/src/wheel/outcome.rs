use rand::Rng;

use crate::WheelItem;

/// Decimal places kept on a requested rotation
const ROTATION_PRECISION: f64 = 1000.;

/// Returns the index of the option the wheel stops on, or `None` for an empty wheel.
///
/// Segments are laid out in order with spans proportional to their weight.
/// The pointer sits 90 degrees past the rotation, and segments are walked
/// from the last one backwards until their cumulative span reaches it.
pub fn spin_outcome(items: &[WheelItem], rotation: f64) -> Option<usize> {
    match items.len() {
        0 => return None,
        1 => return Some(0),
        _ => {}
    }

    let total: f64 = items.iter().map(WheelItem::weight).sum();
    let degrees_per_weight = 360. / total;
    let stop_angle = (rotation + 90.).rem_euclid(360.);
    let mut cumulative = 0.;

    // Every client must round the spans the same way to agree on boundaries
    for (index, item) in items.iter().enumerate().rev() {
        cumulative += item.weight() * degrees_per_weight;

        if stop_angle <= cumulative {
            return Some(index);
        }
    }

    // Rounding can leave the last span a hair short of 360
    Some(0)
}

/// A uniformly random rotation in `[0, 360)`, truncated to 3 decimals
pub fn random_rotation<R>(rng: &mut R) -> f64
where
    R: Rng,
{
    (rng.gen_range(0.0..360.0) * ROTATION_PRECISION).trunc() / ROTATION_PRECISION
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::Color;

    fn items(weights: &[(&str, Option<u32>)]) -> Vec<WheelItem> {
        weights
            .iter()
            .map(|(name, size)| WheelItem::new(*name, Color::default(), *size))
            .collect()
    }

    #[test]
    fn heaviest_last_option_wins_at_rest() {
        let wheel = items(&[("A", Some(1)), ("B", Some(1)), ("C", Some(2))]);

        assert_eq!(spin_outcome(&wheel, 0.), Some(2));
        assert_eq!(spin_outcome(&wheel, 150.), Some(1));
        assert_eq!(spin_outcome(&wheel, 200.), Some(0));
        assert_eq!(spin_outcome(&wheel, 270.), Some(2));
    }

    #[test]
    fn boundaries_use_degrees_per_weight() {
        let wheel = items(&[("A", Some(6)), ("B", Some(7))]);

        // Lands exactly on 7 * (360 / 13), which is a hair past 7 * 360 / 13
        assert_eq!(spin_outcome(&wheel, 103.84615384615387), Some(1));
    }

    #[test]
    fn missing_and_zero_sizes_weigh_one() {
        let wheel = items(&[("A", None), ("B", Some(0))]);

        assert_eq!(spin_outcome(&wheel, 0.), Some(1));
        assert_eq!(spin_outcome(&wheel, 180.), Some(0));
    }

    #[test]
    fn trivial_wheels() {
        assert_eq!(spin_outcome(&[], 42.), None);
        assert_eq!(spin_outcome(&items(&[("Only", Some(3))]), 42.), Some(0));
    }

    #[test]
    fn random_rotations_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            let rotation = random_rotation(&mut rng);

            assert!((0. ..360.).contains(&rotation));
            assert_eq!((rotation * 1000.).round() / 1000., rotation);
        }
    }
}
