mod constant;
mod counter;
mod uniform;
mod zipfian;

pub use constant::Constant;
pub use counter::Counter;
pub use uniform::Uniform;
pub use zipfian::Zipfian;

use rand::RngCore;

use crate::error::{Error, Result};

pub trait Generator<T>: 'static + std::marker::Send + std::marker::Sync {
    fn next(&self, rng: &mut dyn RngCore) -> T;
}

pub trait NumberGenerator: Generator<u64> {}

/// Builds the generator named by a `*distribution` property over `[min, max]`.
pub fn from_distribution(name: &str, min: u64, max: u64) -> Result<Box<dyn NumberGenerator>> {
    if min > max {
        return Err(Error::config(format!(
            "invalid range [{}, {}] for {} distribution",
            min, max, name
        )));
    }
    match name {
        "constant" => Ok(Box::new(Constant::new(max))),
        "uniform" => Ok(Box::new(Uniform::new(min, max))),
        "zipfian" => Ok(Box::new(Zipfian::new_from_range(min, max))),
        _ => Err(Error::config(format!("invalid distribution {:?}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn distributions_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for name in ["constant", "uniform", "zipfian"] {
            let gen = from_distribution(name, 3, 40).unwrap();
            for _ in 0..1000 {
                let v = gen.next(&mut rng);
                assert!((3..=40).contains(&v), "{} produced {}", name, v);
            }
        }
    }

    #[test]
    fn unknown_distribution_is_rejected() {
        assert!(matches!(
            from_distribution("gaussian", 0, 1),
            Err(Error::Configuration(_))
        ));
        assert!(from_distribution("uniform", 5, 1).is_err());
    }
}
