//! Candidate scoring and ordering.
//!
//! The heuristic score is deterministic and always computed; the
//! external reranker, when configured, only reorders the list. Any
//! missing or malformed reranker response falls back to the heuristic
//! order silently (logged, never a run error).
//!
//! Standby trips score on load class; bookable trips score on price and
//! aircraft comfort. Both share the merge/identity layer upstream.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::Reranker;
use crate::domain::{flight_number_variants, FlightRecord, LoadClass, RankedFlight};

const NONSTOP_BONUS: f64 = 250.0;
const DURATION_BONUS_SCALE: f64 = 150.0;
const PRICE_BONUS_SCALE: f64 = 400.0;
const UNKNOWN_DURATION: u32 = 1440;

/// Which scoring family applies to this trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMode {
    /// Load-driven (staff standby listing)
    Standby,

    /// Price-driven (purchasable fare)
    Bookable,
}

/// A ranked list plus how it was ordered
#[derive(Debug)]
pub struct Ranking {
    pub flights: Vec<RankedFlight>,

    /// True when the external reranker supplied the order
    pub reranked: bool,
}

fn load_weight(load: Option<LoadClass>) -> f64 {
    match load {
        Some(LoadClass::High) => 1000.0,
        Some(LoadClass::Mid) => 600.0,
        Some(LoadClass::Low) => 200.0,
        None => 300.0,
    }
}

fn tariff_bonus(tariff: &str) -> f64 {
    match tariff.trim().to_ascii_uppercase().as_str() {
        "R1" => 80.0,
        "R2" => 40.0,
        "ID" => 20.0,
        _ => 0.0,
    }
}

fn comfort_bonus(aircraft: &str) -> f64 {
    let upper = aircraft.to_ascii_uppercase();
    if upper.contains("380") {
        120.0
    } else if upper.contains("777") || upper.contains("77W") || upper.contains("773") {
        80.0
    } else if upper.contains("350") {
        80.0
    } else if upper.contains("787") {
        70.0
    } else if upper.contains("330") {
        50.0
    } else {
        0.0
    }
}

fn effective_duration(flight: &FlightRecord) -> u32 {
    if flight.duration_minutes == 0 {
        UNKNOWN_DURATION
    } else {
        flight.duration_minutes
    }
}

pub struct Ranker {
    reranker: Option<Arc<dyn Reranker>>,
}

impl Ranker {
    pub fn new(reranker: Option<Arc<dyn Reranker>>) -> Self {
        Self { reranker }
    }

    pub fn heuristic_only() -> Self {
        Self { reranker: None }
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Deterministic heuristic scoring and ordering.
    ///
    /// Ties break on earlier departure, then canonical flight number,
    /// so the output is stable across runs.
    pub fn heuristic_rank(&self, candidates: &[FlightRecord], mode: RankMode) -> Vec<RankedFlight> {
        let min_duration = candidates
            .iter()
            .map(effective_duration)
            .min()
            .unwrap_or(UNKNOWN_DURATION);
        let min_price = candidates
            .iter()
            .filter_map(|f| f.price)
            .fold(f64::INFINITY, f64::min);

        let mut scored: Vec<RankedFlight> = candidates
            .iter()
            .map(|flight| {
                let score = match mode {
                    RankMode::Standby => self.standby_score(flight, min_duration),
                    RankMode::Bookable => self.bookable_score(flight, min_duration, min_price),
                };
                RankedFlight {
                    flight: flight.clone(),
                    score,
                    rank: 0,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.flight.departure_time.cmp(&b.flight.departure_time))
                .then_with(|| a.flight.flight_number.cmp(&b.flight.flight_number))
        });
        for (idx, ranked) in scored.iter_mut().enumerate() {
            ranked.rank = idx + 1;
        }
        scored
    }

    fn standby_score(&self, flight: &FlightRecord, min_duration: u32) -> f64 {
        let mut score = load_weight(flight.seats.portal_load);
        if flight.stops == 0 {
            score += NONSTOP_BONUS;
        }
        score += (min_duration as f64 / effective_duration(flight) as f64) * DURATION_BONUS_SCALE;
        score += tariff_bonus(&flight.tariff_class);
        score
    }

    fn bookable_score(&self, flight: &FlightRecord, min_duration: u32, min_price: f64) -> f64 {
        let mut score = match flight.price {
            Some(price) if price > 0.0 && min_price.is_finite() => {
                (min_price / price) * PRICE_BONUS_SCALE
            }
            _ => 0.0,
        };
        score += comfort_bonus(&flight.aircraft);
        if flight.stops == 0 {
            score += NONSTOP_BONUS;
        }
        score += (min_duration as f64 / effective_duration(flight) as f64) * DURATION_BONUS_SCALE;
        score
    }

    /// Rank with the external reranker when available, falling back to
    /// the heuristic order on any failure or unusable response.
    pub async fn rank(
        &self,
        candidates: &[FlightRecord],
        mode: RankMode,
        route: &str,
    ) -> Ranking {
        let heuristic = self.heuristic_rank(candidates, mode);

        let Some(reranker) = &self.reranker else {
            return Ranking {
                flights: heuristic,
                reranked: false,
            };
        };

        let entries = match reranker.rerank(candidates, route).await {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                warn!("reranker returned no usable ranking; using heuristic order");
                return Ranking {
                    flights: heuristic,
                    reranked: false,
                };
            }
            Err(err) => {
                warn!(error = %err, "reranker failed; using heuristic order");
                return Ranking {
                    flights: heuristic,
                    reranked: false,
                };
            }
        };

        // Reorder heuristic entries by the model's list, matching on
        // flight-number variants; anything the model skipped keeps its
        // heuristic order at the tail.
        let mut remaining = heuristic;
        let mut ordered: Vec<RankedFlight> = Vec::with_capacity(remaining.len());
        for entry in entries {
            let variants: BTreeSet<String> = flight_number_variants(&entry.flight_number);
            if variants.is_empty() {
                continue;
            }
            if let Some(pos) = remaining
                .iter()
                .position(|r| r.flight.variants().intersection(&variants).next().is_some())
            {
                ordered.push(remaining.remove(pos));
            }
        }

        if ordered.is_empty() {
            warn!("reranker entries matched no candidates; using heuristic order");
            return Ranking {
                flights: remaining,
                reranked: false,
            };
        }

        ordered.append(&mut remaining);
        for (idx, ranked) in ordered.iter_mut().enumerate() {
            ranked.rank = idx + 1;
        }
        info!(count = ordered.len(), "reranker ordering applied");
        Ranking {
            flights: ordered,
            reranked: true,
        }
    }
}
