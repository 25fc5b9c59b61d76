use crate::models::candidate::{Candidate, MarketStats};

const BASELINE: f64 = 45.0;
const REVIEW_GAP_WEIGHT: f64 = 24.0;
const NO_PRESENCE_BONUS: f64 = 12.0;
const PRESENCE_BONUS: f64 = 4.0;
const NO_SSL_BONUS: f64 = 8.0;
const NO_CONTACT_BONUS: f64 = 8.0;
const NO_PHONE_BONUS: f64 = 6.0;
const NO_VIEWPORT_BONUS: f64 = 3.0;
const NO_SCHEMA_BONUS: f64 = 3.0;
const RATING_ADJUSTMENT: f64 = 4.0;

/// Opportunity score in `[0, 100]`, rounded to two decimals.
///
/// Higher means more room for improvement: a review shortfall against the
/// market, missing web presence, or missing trust and conversion signals.
pub fn rank_key(candidate: &Candidate, market_avg_reviews: f64) -> f64 {
    let mut score = BASELINE;

    if market_avg_reviews > 0.0 {
        let gap = (market_avg_reviews - candidate.user_ratings_total as f64) / market_avg_reviews;
        score += gap.clamp(0.0, 1.0) * REVIEW_GAP_WEIGHT;
    }

    if candidate.has_website {
        score += PRESENCE_BONUS;
        if !candidate.ssl {
            score += NO_SSL_BONUS;
        }
        if !candidate.has_contact_form {
            score += NO_CONTACT_BONUS;
        }
        if !candidate.has_viewport {
            score += NO_VIEWPORT_BONUS;
        }
        if !candidate.has_schema {
            score += NO_SCHEMA_BONUS;
        }
    } else {
        score += NO_PRESENCE_BONUS;
    }

    if !candidate.has_phone {
        score += NO_PHONE_BONUS;
    }

    match candidate.rating {
        Some(r) if r >= 4.5 => score += RATING_ADJUSTMENT,
        Some(r) if r < 3.5 => score -= RATING_ADJUSTMENT,
        _ => {}
    }

    (score.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

/// Mean review count over reviewed candidates and mean rating over rated ones.
/// Zero when nothing qualifies.
pub fn market_stats(candidates: &[Candidate]) -> MarketStats {
    let reviews: Vec<f64> = candidates
        .iter()
        .filter(|c| c.user_ratings_total > 0)
        .map(|c| c.user_ratings_total as f64)
        .collect();
    let ratings: Vec<f64> = candidates.iter().filter_map(|c| c.rating).collect();

    let mean = |v: &[f64]| {
        if v.is_empty() {
            0.0
        } else {
            v.iter().sum::<f64>() / v.len() as f64
        }
    };

    MarketStats {
        avg_reviews: mean(&reviews),
        avg_rating: mean(&ratings),
    }
}

/// Set the below-average flags against the market.
pub fn apply_market_flags(candidate: &mut Candidate, stats: &MarketStats) {
    candidate.below_review_avg =
        stats.avg_reviews > 0.0 && (candidate.user_ratings_total as f64) < stats.avg_reviews;
    candidate.below_rating_avg =
        stats.avg_rating > 0.0 && candidate.rating.unwrap_or(0.0) < stats.avg_rating;
}

/// Descending by rank key. Stable, so ties keep first-seen order.
pub fn sort_by_rank_key(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.rank_key.total_cmp(&a.rank_key));
}

/// Number the candidates 1..N in their current order.
pub fn assign_ranks(candidates: &mut [Candidate]) {
    for (idx, c) in candidates.iter_mut().enumerate() {
        c.rank = Some(idx as u32 + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::{PlaceDetails, PlaceSummary};

    fn candidate(id: &str, reviews: u32) -> Candidate {
        let summary = PlaceSummary {
            place_id: id.to_string(),
            name: id.to_string(),
            address: None,
            location: None,
            rating: None,
            user_ratings_total: Some(reviews),
        };
        let details = PlaceDetails {
            place_id: id.to_string(),
            ..Default::default()
        };
        Candidate::from_details(&summary, &details, "Austin", Some("TX"))
    }

    #[test]
    fn test_rank_key_no_presence() {
        let c10 = candidate("c10", 10);
        assert_eq!(rank_key(&c10, 50.0), 82.2);
    }

    #[test]
    fn test_rank_key_full_presence() {
        let mut c60 = candidate("c60", 60);
        c60.has_website = true;
        c60.website = Some("https://c60.example".to_string());
        c60.ssl = true;
        c60.has_contact_form = true;
        c60.has_phone = true;
        c60.has_viewport = true;
        c60.has_schema = true;
        c60.rating = Some(4.8);
        assert_eq!(rank_key(&c60, 50.0), 53.0);
    }

    #[test]
    fn test_sort_places_bigger_gap_first() {
        let mut c10 = candidate("c10", 10);
        c10.rank_key = rank_key(&c10, 50.0);
        let mut c60 = candidate("c60", 60);
        c60.has_website = true;
        c60.ssl = true;
        c60.has_contact_form = true;
        c60.has_phone = true;
        c60.has_viewport = true;
        c60.has_schema = true;
        c60.rating = Some(4.6);
        c60.rank_key = rank_key(&c60, 50.0);

        let mut list = vec![c60, c10];
        sort_by_rank_key(&mut list);
        assert_eq!(list[0].place_id, "c10");
        assert_eq!(list[1].place_id, "c60");
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut list: Vec<Candidate> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| {
                let mut c = candidate(id, 5);
                c.rank_key = if *id == "c" { 70.0 } else { 60.0 };
                c
            })
            .collect();
        sort_by_rank_key(&mut list);
        assign_ranks(&mut list);

        let order: Vec<_> = list.iter().map(|c| c.place_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
        let ranks: Vec<_> = list.iter().map(|c| c.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_low_rating_and_clamp() {
        let mut c = candidate("x", 0);
        c.rating = Some(2.9);
        // No market average: 45 + 12 + 6 - 4
        assert_eq!(rank_key(&c, 0.0), 59.0);
    }

    #[test]
    fn test_market_stats_skip_unreviewed() {
        let mut a = candidate("a", 0);
        a.rating = Some(4.0);
        let b = candidate("b", 30);
        let mut c = candidate("c", 10);
        c.rating = Some(3.0);

        let stats = market_stats(&[a, b.clone(), c]);
        assert_eq!(stats.avg_reviews, 20.0);
        assert_eq!(stats.avg_rating, 3.5);

        let mut b = b;
        apply_market_flags(&mut b, &stats);
        assert!(!b.below_review_avg);
        // Unrated counts as below a positive rating average.
        assert!(b.below_rating_avg);
    }
}
