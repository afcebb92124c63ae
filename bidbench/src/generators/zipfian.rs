use rand::{Rng, RngCore};

use super::{Generator, NumberGenerator};

pub struct Zipfian {
    items: u64,
    base: u64,
    alpha: f64,
    zetan: f64,
    eta: f64,
    theta: f64,
}

const ZIPFIAN_CONSTANT: f64 = 0.99;

impl Zipfian {
    pub fn new_from_count(items: u64) -> Zipfian {
        Self::new_from_range(0, items.max(1) - 1)
    }

    pub fn new_from_range(min: u64, max: u64) -> Zipfian {
        Self::new(min, max, ZIPFIAN_CONSTANT)
    }

    pub fn new(min: u64, max: u64, constant: f64) -> Zipfian {
        let items = max.max(min) - min + 1;
        let theta = constant;
        let zetan = Self::zetastatic(0, items, theta, 0.0);
        let zeta2theta = Self::zeta(2, theta);
        Zipfian {
            items,
            base: min,
            theta,
            alpha: 1.0 / (1.0 - theta),
            zetan,
            eta: (1.0 - (2.0 / items as f64)).powf(1.0 - theta) / (1.0 - zeta2theta / zetan),
        }
    }

    fn zeta(n: u64, theta_value: f64) -> f64 {
        Self::zetastatic(0, n, theta_value, 0.0)
    }

    fn zetastatic(st: u64, n: u64, theta: f64, initialsum: f64) -> f64 {
        let mut sum = initialsum;
        for i in st..n {
            sum += 1.0 / ((i + 1) as f64).powf(theta);
        }
        sum
    }
}

impl NumberGenerator for Zipfian {}

impl Generator<u64> for Zipfian {
    fn next(&self, rng: &mut dyn RngCore) -> u64 {
        if self.items == 1 {
            return self.base;
        }
        let u = rng.gen::<f64>();
        let uz = u * self.zetan;
        if uz < 1.0 {
            return self.base;
        }
        if uz < 1.0 + 0.5f64.powf(self.theta) {
            return self.base + 1;
        }
        let offset = ((self.items as f64) * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64;
        self.base + offset.min(self.items - 1)
    }
}
