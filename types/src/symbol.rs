//! The rune alphabet and ring distance.
//!
//! Players pick one of a fixed, ordered set of 22 runes each block. Distance
//! between two runes is measured on the circular alphabet: the minimum of
//! the direct index difference and the wrap-around difference. The maximum
//! possible distance is therefore `SYMBOL_COUNT / 2`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of runes in the alphabet.
pub const SYMBOL_COUNT: usize = 22;

/// The fixed, ordered rune alphabet. Order matters: distance is defined over
/// indices into this array.
pub const ALPHABET: [char; SYMBOL_COUNT] = [
    'ᚹ', 'ᚾ', 'ᚦ', 'ᚠ', 'ᚱ', 'ᚲ', 'ᛉ', 'ᛈ', 'ᚺ', 'ᛏ', 'ᛁ', 'ᛋ', 'ᛇ', 'ᚨ', 'ᛃ', 'ᛟ', 'ᛞ', 'ᛒ',
    'ᛗ', 'ᛚ', 'ᛜ', 'ᛝ',
];

/// One rune of the alphabet, stored as its index.
///
/// Serialized as the rune character itself so persisted documents stay
/// human-readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct Symbol(u8);

impl Symbol {
    /// Construct a symbol from an alphabet index.
    pub fn from_index(index: usize) -> Option<Self> {
        if index < SYMBOL_COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Index of this rune in the alphabet.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// The rune character.
    pub fn glyph(&self) -> char {
        ALPHABET[self.0 as usize]
    }

    /// Ring distance to another rune: `min(|i-j|, N-|i-j|)`.
    pub fn distance(&self, other: Symbol) -> u32 {
        let a = self.0 as i32;
        let b = other.0 as i32;
        let direct = (a - b).unsigned_abs();
        let wrap = SYMBOL_COUNT as u32 - direct;
        direct.min(wrap)
    }

    /// Draw a uniformly random rune.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(0..SYMBOL_COUNT as u8))
    }

    /// Iterate over the whole alphabet.
    pub fn all() -> impl Iterator<Item = Symbol> {
        (0..SYMBOL_COUNT as u8).map(Symbol)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

impl TryFrom<char> for Symbol {
    type Error = String;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        ALPHABET
            .iter()
            .position(|&c| c == value)
            .map(|i| Symbol(i as u8))
            .ok_or_else(|| format!("unknown rune: {value:?}"))
    }
}

impl From<Symbol> for char {
    fn from(symbol: Symbol) -> char {
        symbol.glyph()
    }
}

/// Verify the alphabet contains no duplicate runes.
///
/// Duplicates would make distance ambiguous, so this is checked once at
/// startup and treated as fatal.
pub fn validate_alphabet() -> Result<(), String> {
    for (i, a) in ALPHABET.iter().enumerate() {
        for b in ALPHABET.iter().skip(i + 1) {
            if a == b {
                return Err(format!("duplicate rune in alphabet: {a:?}"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_alphabet_is_unique() {
        assert!(validate_alphabet().is_ok());
    }

    #[test]
    fn test_distance_is_symmetric() {
        for a in Symbol::all() {
            for b in Symbol::all() {
                assert_eq!(a.distance(b), b.distance(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for a in Symbol::all() {
            assert_eq!(a.distance(a), 0);
        }
    }

    #[test]
    fn test_distance_is_bounded_by_half_ring() {
        let max = Symbol::all()
            .flat_map(|a| Symbol::all().map(move |b| a.distance(b)))
            .max()
            .unwrap();
        assert_eq!(max, (SYMBOL_COUNT / 2) as u32);
    }

    #[test]
    fn test_distance_wraps_around() {
        let first = Symbol::from_index(0).unwrap();
        let last = Symbol::from_index(SYMBOL_COUNT - 1).unwrap();
        // Adjacent on the ring despite being at opposite ends of the array.
        assert_eq!(first.distance(last), 1);

        let opposite = Symbol::from_index(SYMBOL_COUNT / 2).unwrap();
        assert_eq!(first.distance(opposite), (SYMBOL_COUNT / 2) as u32);
    }

    #[test]
    fn test_serde_round_trip_as_char() {
        for symbol in Symbol::all() {
            let json = serde_json::to_string(&symbol).unwrap();
            assert_eq!(json, format!("\"{}\"", symbol.glyph()));
            let back: Symbol = serde_json::from_str(&json).unwrap();
            assert_eq!(back, symbol);
        }
    }

    #[test]
    fn test_unknown_rune_rejected() {
        let result: Result<Symbol, _> = serde_json::from_str("\"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_random_stays_in_alphabet() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1_000 {
            let symbol = Symbol::random(&mut rng);
            assert!(symbol.index() < SYMBOL_COUNT);
        }
    }
}
