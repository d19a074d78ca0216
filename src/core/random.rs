// Copyright (C) 2024 Bellande Artificial Intelligence Computer Vision Research Innovation Center, Ronaldson Bellande

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Per-thread random source used by the stochastic transforms.
//!
//! Every thread starts from entropy. Calling [`set_seed`] makes the sequence
//! of augmentations drawn on that thread reproducible.

use rand::prelude::*;
use rand_distr::{Bernoulli, Uniform};
use std::cell::RefCell;

thread_local! {
    static GENERATOR: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

pub fn set_seed(seed: u64) {
    GENERATOR.with(|g| {
        *g.borrow_mut() = StdRng::seed_from_u64(seed);
    });
}

/// Sample from `[low, high)`. Returns `low` when the range is empty.
pub fn uniform(low: f64, high: f64) -> f64 {
    if !(high > low) {
        return low;
    }
    let uniform = Uniform::new(low, high);
    GENERATOR.with(|g| uniform.sample(&mut *g.borrow_mut()))
}

pub fn bernoulli(p: f64) -> bool {
    match Bernoulli::new(p) {
        Ok(dist) => GENERATOR.with(|g| dist.sample(&mut *g.borrow_mut())),
        Err(_) => p >= 1.0,
    }
}

/// Uniform integer in `0..=max`.
pub fn gen_index(max: u32) -> u32 {
    GENERATOR.with(|g| g.borrow_mut().gen_range(0..=max))
}
