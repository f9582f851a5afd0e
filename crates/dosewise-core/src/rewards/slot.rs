//! Weighted slot-machine resolution.
//!
//! Three symbols are drawn independently from a configured weight table
//! (heavier weight = more common). Three-of-a-kind maps through the prize
//! table to a named prize; exactly two matching symbols pay a fixed pair
//! prize; no match pays a consolation prize. Resolution is pure given an
//! `Rng`, so tests drive it with a seeded `rand_pcg::Pcg32`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::rewards::BadgeType;

/// A slot reel symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSymbol {
    Pill,
    Heart,
    Star,
    Clover,
    Gem,
    Crown,
}

impl SlotSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotSymbol::Pill => "pill",
            SlotSymbol::Heart => "heart",
            SlotSymbol::Star => "star",
            SlotSymbol::Clover => "clover",
            SlotSymbol::Gem => "gem",
            SlotSymbol::Crown => "crown",
        }
    }
}

/// One row of the symbol weight table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolWeight {
    pub symbol: SlotSymbol,
    pub weight: u32,
}

/// Classification of a resolved triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinOutcome {
    ThreeOfAKind,
    Pair,
    Miss,
}

/// A prize resolved from a spin (or granted by a challenge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prize {
    Coins { amount: i64 },
    Multiplier { amount: f64 },
    Shield { hours: i64 },
    BonusSpins { count: i64 },
    Badge { badge: BadgeType },
    Jackpot { amount: i64 },
}

/// One row of the triple prize table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriplePrize {
    pub symbol: SlotSymbol,
    pub prize: Prize,
}

/// The resolved result of one spin, as returned to the caller and recorded
/// to history. Never mutated after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinResult {
    pub history_id: String,
    pub symbols: [SlotSymbol; 3],
    pub outcome: SpinOutcome,
    pub prize: Prize,
    /// Coins actually credited after multiplier and boost adjustment
    /// (zero for non-coin prizes).
    pub coins_credited: i64,
    pub spins_remaining: i64,
    /// Lowest coin milestone crossed by this spin, if any.
    pub milestone: Option<i64>,
}

/// Draw one symbol from the weight table. Callers guarantee the weights
/// sum to a positive total.
fn draw<R: Rng>(rng: &mut R, weights: &[SymbolWeight]) -> SlotSymbol {
    let total: u32 = weights.iter().map(|w| w.weight).sum();
    let mut roll = rng.gen_range(0..total);
    for entry in weights {
        if roll < entry.weight {
            return entry.symbol;
        }
        roll -= entry.weight;
    }
    // Unreachable while total > 0; fall back to the last entry.
    weights.last().map(|w| w.symbol).unwrap_or(SlotSymbol::Pill)
}

/// Draw three symbols independently. An empty or all-zero weight table
/// (possible through a hand-edited config file) is rejected rather than
/// drawn from.
pub fn roll_symbols<R: Rng>(
    rng: &mut R,
    weights: &[SymbolWeight],
) -> Result<[SlotSymbol; 3], ValidationError> {
    let total: u32 = weights.iter().map(|w| w.weight).sum();
    if total == 0 {
        return Err(ValidationError::InvalidValue {
            field: "rewards.symbol_weights".to_string(),
            message: "at least one symbol weight must be positive".to_string(),
        });
    }
    Ok([draw(rng, weights), draw(rng, weights), draw(rng, weights)])
}

/// Classify a resolved triple.
pub fn classify(symbols: &[SlotSymbol; 3]) -> SpinOutcome {
    let [a, b, c] = symbols;
    if a == b && b == c {
        SpinOutcome::ThreeOfAKind
    } else if a == b || b == c || a == c {
        SpinOutcome::Pair
    } else {
        SpinOutcome::Miss
    }
}

/// The symbol that appears at least twice in a pair or triple.
fn matched_symbol(symbols: &[SlotSymbol; 3]) -> SlotSymbol {
    let [a, b, c] = symbols;
    if a == b || a == c {
        *a
    } else {
        *b
    }
}

/// Map a classified triple to its prize.
pub fn resolve_prize(
    symbols: &[SlotSymbol; 3],
    outcome: SpinOutcome,
    triples: &[TriplePrize],
    pair_coins: i64,
    consolation_coins: i64,
) -> Prize {
    match outcome {
        SpinOutcome::ThreeOfAKind => {
            let symbol = matched_symbol(symbols);
            triples
                .iter()
                .find(|t| t.symbol == symbol)
                .map(|t| t.prize.clone())
                .unwrap_or(Prize::Coins { amount: pair_coins })
        }
        SpinOutcome::Pair => Prize::Coins { amount: pair_coins },
        SpinOutcome::Miss => Prize::Coins {
            amount: consolation_coins,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn weights() -> Vec<SymbolWeight> {
        vec![
            SymbolWeight { symbol: SlotSymbol::Pill, weight: 30 },
            SymbolWeight { symbol: SlotSymbol::Heart, weight: 25 },
            SymbolWeight { symbol: SlotSymbol::Star, weight: 20 },
            SymbolWeight { symbol: SlotSymbol::Clover, weight: 15 },
            SymbolWeight { symbol: SlotSymbol::Gem, weight: 7 },
            SymbolWeight { symbol: SlotSymbol::Crown, weight: 3 },
        ]
    }

    #[test]
    fn classify_triples() {
        use SlotSymbol::*;
        assert_eq!(classify(&[Pill, Pill, Pill]), SpinOutcome::ThreeOfAKind);
        assert_eq!(classify(&[Pill, Star, Pill]), SpinOutcome::Pair);
        assert_eq!(classify(&[Star, Star, Pill]), SpinOutcome::Pair);
        assert_eq!(classify(&[Pill, Star, Star]), SpinOutcome::Pair);
        assert_eq!(classify(&[Pill, Star, Crown]), SpinOutcome::Miss);
    }

    #[test]
    fn weighted_draw_respects_weights() {
        // A zero-weight symbol must never be drawn, an all-weight one always.
        let skewed = vec![
            SymbolWeight { symbol: SlotSymbol::Crown, weight: 0 },
            SymbolWeight { symbol: SlotSymbol::Pill, weight: 10 },
        ];
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(draw(&mut rng, &skewed), SlotSymbol::Pill);
        }
    }

    #[test]
    fn heavier_symbols_come_up_more_often() {
        let weights = weights();
        let mut rng = Pcg32::seed_from_u64(42);
        let mut pill = 0u32;
        let mut crown = 0u32;
        for _ in 0..2000 {
            match draw(&mut rng, &weights) {
                SlotSymbol::Pill => pill += 1,
                SlotSymbol::Crown => crown += 1,
                _ => {}
            }
        }
        assert!(pill > crown * 3, "pill={pill} crown={crown}");
    }

    #[test]
    fn seeded_roll_is_reproducible() {
        let weights = weights();
        let a = roll_symbols(&mut Pcg32::seed_from_u64(99), &weights).unwrap();
        let b = roll_symbols(&mut Pcg32::seed_from_u64(99), &weights).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_weight_table_is_rejected() {
        let mut rng = Pcg32::seed_from_u64(1);
        let err = roll_symbols(&mut rng, &[]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));

        let zeroed = vec![
            SymbolWeight { symbol: SlotSymbol::Pill, weight: 0 },
            SymbolWeight { symbol: SlotSymbol::Crown, weight: 0 },
        ];
        assert!(roll_symbols(&mut rng, &zeroed).is_err());
    }

    #[test]
    fn pair_and_miss_resolve_to_fixed_coins() {
        use SlotSymbol::*;
        let triples = vec![TriplePrize {
            symbol: Crown,
            prize: Prize::Jackpot { amount: 500 },
        }];
        assert_eq!(
            resolve_prize(&[Pill, Pill, Star], SpinOutcome::Pair, &triples, 15, 5),
            Prize::Coins { amount: 15 }
        );
        assert_eq!(
            resolve_prize(&[Pill, Heart, Star], SpinOutcome::Miss, &triples, 15, 5),
            Prize::Coins { amount: 5 }
        );
        assert_eq!(
            resolve_prize(&[Crown, Crown, Crown], SpinOutcome::ThreeOfAKind, &triples, 15, 5),
            Prize::Jackpot { amount: 500 }
        );
    }
}
