//! Color generation and the difficulty curve.
//!
//! Every level is a square grid filled with one base color except a single
//! "odd" tile whose color differs in exactly one HSL channel. The size of that
//! difference shrinks as the level climbs.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Largest grid side; levels past this keep the 6x6 board.
pub const MAX_GRID_SIDE: u32 = 6;

const SATURATION_RANGE: (i32, i32) = (10, 90);
const LIGHTNESS_RANGE: (i32, i32) = (20, 80);

/// Color in HSL space. Hue in degrees, saturation / lightness in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsl {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl Hsl {
    pub fn new(hue: u16, saturation: u8, lightness: u8) -> Self {
        Self {
            hue,
            saturation,
            lightness,
        }
    }
}

impl fmt::Display for Hsl {
    /// CSS notation, e.g. `hsl(120, 60%, 50%)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

/// The channel that distinguishes the odd tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Hue,
    Saturation,
    Lightness,
}

/// Uniform base color: hue [0,360), saturation [50,100), lightness [40,80).
pub fn generate_base_color<R: Rng + ?Sized>(rng: &mut R) -> Hsl {
    Hsl {
        hue: rng.gen_range(0..360),
        saturation: rng.gen_range(50..100),
        lightness: rng.gen_range(40..80),
    }
}

/// Upper bound (exclusive, before the +3 floor) of the perturbation for a level.
pub fn difficulty_base(level: u32) -> u32 {
    if level <= 3 {
        30u32.saturating_sub(5 * level)
    } else if level <= 10 {
        20 - 2 * (level - 3)
    } else {
        8u32.saturating_sub(level - 10).max(3)
    }
}

/// Side length of the square grid at `level`.
pub fn grid_side(level: u32) -> u32 {
    (3 + level / 3).min(MAX_GRID_SIDE)
}

/// Odd color for `base` at `level`: one channel moved by a magnitude in
/// `[3, difficulty_base(level) + 3)`.
pub fn generate_odd_color<R: Rng + ?Sized>(base: Hsl, level: u32, rng: &mut R) -> Hsl {
    let magnitude = rng.gen_range(0..difficulty_base(level).max(1)) + 3;
    let channel = match rng.gen_range(0..3) {
        0 => Channel::Hue,
        1 => Channel::Saturation,
        _ => Channel::Lightness,
    };
    let raise = rng.gen_bool(0.5);
    perturb(base, channel, magnitude, raise)
}

/// Deterministic core of [`generate_odd_color`].
///
/// Hue always moves forward and wraps at 360. Saturation and lightness move in
/// the requested direction and are clamped; if clamping would leave the channel
/// unchanged the opposite direction is taken so the odd tile never matches.
pub fn perturb(base: Hsl, channel: Channel, magnitude: u32, raise: bool) -> Hsl {
    let magnitude = magnitude as i32;
    let shift = |value: u8, (lo, hi): (i32, i32)| -> u8 {
        let value = i32::from(value);
        let toward = if raise { magnitude } else { -magnitude };
        let moved = (value + toward).clamp(lo, hi);
        let moved = if moved == value {
            (value - toward).clamp(lo, hi)
        } else {
            moved
        };
        moved as u8
    };
    let mut odd = base;
    match channel {
        Channel::Hue => {
            odd.hue = ((i32::from(base.hue) + magnitude) % 360) as u16;
        }
        Channel::Saturation => odd.saturation = shift(base.saturation, SATURATION_RANGE),
        Channel::Lightness => odd.lightness = shift(base.lightness, LIGHTNESS_RANGE),
    }
    odd
}

/// One generated board: `side * side` tiles, all `base` except `odd_index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelLayout {
    pub level: u32,
    pub side: u32,
    pub base: Hsl,
    pub odd: Hsl,
    pub odd_index: usize,
}

impl LevelLayout {
    pub fn generate<R: Rng + ?Sized>(level: u32, rng: &mut R) -> Self {
        let side = grid_side(level);
        let base = generate_base_color(rng);
        let odd = generate_odd_color(base, level, rng);
        let odd_index = rng.gen_range(0..(side * side) as usize);
        Self {
            level,
            side,
            base,
            odd,
            odd_index,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.side * self.side) as usize
    }

    pub fn is_odd(&self, index: usize) -> bool {
        index == self.odd_index
    }

    pub fn tile_color(&self, index: usize) -> Option<Hsl> {
        if index >= self.tile_count() {
            None
        } else if self.is_odd(index) {
            Some(self.odd)
        } else {
            Some(self.base)
        }
    }
}
