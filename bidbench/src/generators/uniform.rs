use rand::{Rng, RngCore};

use super::{Generator, NumberGenerator};

/// Uniform over the inclusive range `[min, max]`.
pub struct Uniform {
    min: u64,
    max: u64,
}

impl Uniform {
    pub fn new(min: u64, max: u64) -> Self {
        Uniform {
            min,
            max: max.max(min),
        }
    }
}

impl NumberGenerator for Uniform {}
impl Generator<u64> for Uniform {
    fn next(&self, rng: &mut dyn RngCore) -> u64 {
        rng.gen_range(self.min..=self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let gen = Uniform::new(4, 9);
        for _ in 0..1000 {
            assert!((4..=9).contains(&gen.next(&mut rng)));
        }
        assert_eq!(Uniform::new(7, 2).next(&mut rng), 7);
    }
}
